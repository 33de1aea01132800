//! # Orchestration モジュール
//!
//! セッションプランに従ってリモート制御セッション全体を実行する
//! オーケストレーションエンジンを提供します。
//!
//! ## 実行順序
//!
//! 1. **プロセス起動**（有効時）: シミュレータを子プロセスとして起動し、
//!    制御ポートが受け付け状態になるまで待機
//! 2. **セッション確立**: 制御チャンネルを開いてハンドシェイク
//! 3. **シナリオ構築**: プランから車両配置を組み立てて make
//! 4. **実行準備**: 決定論モード設定 → 先行ポーズ → ロード → 開始
//! 5. **設定バッチ適用**: プランの各バッチを順に change + apply
//! 6. **後始末**: 停止 → セッション解放 → プロセス終了・回収
//!
//! 後始末はどの失敗経路でも必ず実行されます。セッション解放とプロセス
//! 終了は冪等なので、途中の失敗後に重ねて呼んでも安全です。

use std::time::Duration;
use tracing::{error, info, warn};

use crate::plan::{ScenarioSection, SessionPlan};
use crate::remote::common::{Position3D, Quaternion, SimulatorEndpoint};
use crate::remote::error::RemoteError;
use crate::remote::launcher::SimulatorProcess;
use crate::remote::session::Session;
use crate::remote::settings::Settings;
use crate::remote::RunControl;
use crate::scenario::{Scenario, VehiclePlacement};

/// セッション全体を実行するオーケストレーションエンジン
pub struct SessionOrchestrator {
    plan: SessionPlan,
    verbose_level: u8,
}

impl SessionOrchestrator {
    pub fn new(plan: SessionPlan, verbose_level: u8) -> Self {
        Self { plan, verbose_level }
    }

    /// プランの接続先
    pub fn endpoint(&self) -> SimulatorEndpoint {
        SimulatorEndpoint::new(
            self.plan.endpoint.host.clone(),
            self.plan.endpoint.port,
            self.plan.endpoint.home.clone(),
        )
    }

    /// セッション全体を実行する
    ///
    /// セットアップ中の失敗はセッション試行を中断します。設定適用の失敗は
    /// 回復可能ですが、プラン実行では中断扱いにして呼び出し元へ返します
    /// （どのキーが拒否されたかはエラーに含まれます）。
    pub fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let endpoint = self.endpoint();

        info!("=== リモート制御セッション開始 ===");
        info!("接続先: {}", endpoint);

        // プロセス起動（有効時）
        let mut process = if self.plan.launch.enabled {
            let mut process = SimulatorProcess::launch(
                &endpoint,
                &self.plan.launch.user_dir,
                &self.plan.launch.extra_args,
            )?;
            let timeout = Duration::from_secs_f64(self.plan.launch.ready_timeout_s);
            process.wait_until_ready(&endpoint, timeout)?;
            Some(process)
        } else {
            info!("既存のシミュレータプロセスへ接続します");
            None
        };

        // セッションはスコープ付きで利用し、どの経路でも解放をちょうど1回行う
        let mut session = Session::new(endpoint);
        let result = session.scope(|s| self.run_protocol(s));

        // 子プロセスの後始末（冪等）
        if let Some(process) = &mut process {
            process.terminate();
            process.wait();
        }

        match &result {
            Ok(()) => {
                info!("=== セッション正常終了 ===");
            }
            Err(e) => {
                error!("セッションが失敗しました: {}", e);
            }
        }

        result.map_err(Into::into)
    }

    /// 開いたセッション上でプロトコル本体を実行する
    fn run_protocol(&self, session: &mut Session) -> Result<(), RemoteError> {
        // シナリオ構築 + make
        let mut scenario = build_scenario(&self.plan.scenario)?;
        scenario.make(session)?;

        // 決定論モードはstartより前に設定する
        let mut settings = Settings::new();
        settings.set_deterministic(session, self.plan.determinism.steps_per_second)?;

        // 先行ポーズで、設定適用前にシミュレーションが進むのを防ぐ
        let mut control = RunControl::new();
        control.pause(session)?;
        control.load(session, &scenario)?;
        control.start(session)?;

        // 設定バッチを順に適用
        for (i, batch) in self.plan.settings_batches.iter().enumerate() {
            for entry in batch {
                settings.change(entry.key.clone(), entry.value.clone());
            }
            match settings.apply(session) {
                Ok(()) => {
                    if self.verbose_level > 0 {
                        info!("設定バッチ{}を適用しました ({}件)", i + 1, batch.len());
                    }
                }
                Err(e) => {
                    warn!("設定バッチ{}の適用に失敗しました: {}", i + 1, e);
                    return Err(e);
                }
            }
        }

        control.stop(session)?;
        Ok(())
    }
}

/// プランのシナリオ設定からクライアント側シナリオを組み立てる
fn build_scenario(section: &ScenarioSection) -> Result<Scenario, RemoteError> {
    let mut scenario = Scenario::new(section.level.clone(), section.name.clone());
    for vehicle in &section.vehicles {
        scenario.add_vehicle(VehiclePlacement::new(
            vehicle.id.clone(),
            vehicle.model.clone(),
            vehicle.color.clone(),
            Position3D::new(vehicle.pos.x, vehicle.pos.y, vehicle.pos.z),
            Quaternion::new(
                vehicle.rot_quat.x,
                vehicle.rot_quat.y,
                vehicle.rot_quat.z,
                vehicle.rot_quat.w,
            ),
        ))?;
    }
    Ok(scenario)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::SessionPlan;
    use crate::remote::session::mock::ScriptedChannel;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn demo_plan() -> SessionPlan {
        serde_yaml::from_str(
            r#"
meta:
  version: "1.0"
  name: "graphics_demo"
  description: "グラフィック設定変更のデモ"
endpoint:
  host: "localhost"
  port: 25252
  home: "/opt/simulator"
launch:
  enabled: false
  user_dir: "/tmp/sim-user"
  ready_timeout_s: 120.0
scenario:
  level: "italy"
  name: "demo"
  vehicles:
    - id: "ego"
      model: "etk800"
      color: "White"
      pos: { x: 237.90, y: -894.42, z: 246.10 }
      rot_quat: { x: 0.0173, y: -0.0019, z: -0.6354, w: 0.7720 }
determinism:
  steps_per_second: 60
settings_batches:
  - - key: "GraphicDisplayModes"
      value: "Fullscreen"
    - key: "GraphicDisplayResolutions"
      value: "1920 1080"
  - - key: "GraphicDisplayModes"
      value: "Window"
    - key: "WindowPlacement"
      value: "0 1 -1 -1 -1 -1 100 100 1180 2020"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_build_scenario_from_plan() {
        let plan = demo_plan();
        let scenario = build_scenario(&plan.scenario).unwrap();
        assert_eq!(scenario.level(), "italy");
        assert_eq!(scenario.name(), "demo");
        assert_eq!(scenario.vehicles().len(), 1);
        assert_eq!(scenario.vehicles()[0].id, "ego");
    }

    #[test]
    fn test_end_to_end_command_sequence() {
        let plan = demo_plan();
        let orchestrator = SessionOrchestrator::new(plan, 1);

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut session = Session::new(orchestrator.endpoint());
        session
            .open_with(Box::new(ScriptedChannel::acking_logged(log.clone())))
            .unwrap();

        orchestrator.run_protocol(&mut session).unwrap();
        session.close();

        let commands: Vec<&'static str> = log
            .borrow()
            .iter()
            .map(|r| r.command_name())
            .collect();
        assert_eq!(
            commands,
            vec![
                "connect",
                "scenario.make",
                "settings.setDeterministic",
                "settings.apply",
                "control.pause",
                "scenario.load",
                "scenario.start",
                // バッチ1: fullscreen
                "settings.change",
                "settings.change",
                "settings.apply",
                // バッチ2: windowed
                "settings.change",
                "settings.change",
                "settings.apply",
                "scenario.stop",
            ]
        );
    }

    #[test]
    fn test_endpoint_from_plan() {
        let orchestrator = SessionOrchestrator::new(demo_plan(), 0);
        let endpoint = orchestrator.endpoint();
        assert_eq!(endpoint.address(), "localhost:25252");
    }
}
