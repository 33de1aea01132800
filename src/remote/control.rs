//! # Control モジュール
//!
//! 実行制御のファサードを提供します。ポーズ／再開とシナリオの
//! ロード／開始／停止で対話フェーズを囲む、小さな状態機械です。
//!
//! ## 状態遷移
//!
//! ```text
//! Idle → Paused → Loaded → Running → Stopped
//! ```
//!
//! - `pause`: Idle/Running → Paused（シナリオロード前の先行ポーズを含む）
//! - `load`: Paused → Loaded（make済みシナリオのみ）
//! - `start`: Loaded → Running
//! - `resume`: Paused → Running（start後のポーズからのみ）
//! - `stop`: Running/Paused → Stopped（Stopped済みならノーオペ）
//!
//! 遷移の失敗は自動では再試行せず、すべて呼び出し元へ返します。

use tracing::{debug, info};

use crate::remote::error::RemoteError;
use crate::remote::session::Session;
use crate::remote::transport::Request;
use crate::scenario::Scenario;

/// 実行制御の状態
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunState {
    /// 初期状態
    Idle,
    /// ポーズ中（シミュレーション時間停止）
    Paused,
    /// シナリオロード済み
    Loaded,
    /// シナリオ実行中
    Running,
    /// 停止済み
    Stopped,
}

impl RunState {
    fn name(&self) -> &'static str {
        match self {
            RunState::Idle => "Idle",
            RunState::Paused => "Paused",
            RunState::Loaded => "Loaded",
            RunState::Running => "Running",
            RunState::Stopped => "Stopped",
        }
    }
}

/// 実行制御ファサード
///
/// クライアント側で遷移の正当性を検査してから要求を送ります。
/// シミュレータ側が要求を拒否した場合も同じ遷移エラーとして扱います。
pub struct RunControl {
    state: RunState,
    /// start済みかどうか（先行ポーズからのresumeを拒否するため）
    started: bool,
}

impl RunControl {
    pub fn new() -> Self {
        Self {
            state: RunState::Idle,
            started: false,
        }
    }

    /// 現在の状態
    pub fn state(&self) -> RunState {
        self.state
    }

    fn invalid(&self, operation: &'static str) -> RemoteError {
        RemoteError::InvalidStateTransition {
            from: self.state.name(),
            operation,
        }
    }

    fn send_checked(
        &self,
        session: &mut Session,
        request: &Request,
        operation: &'static str,
    ) -> Result<(), RemoteError> {
        let response = session.request(request)?;
        if response.ack {
            Ok(())
        } else {
            debug!(
                "シミュレータが {} を拒否しました: {}",
                operation,
                response.reason_or_default()
            );
            Err(self.invalid(operation))
        }
    }

    /// シミュレーション時間を停止する
    ///
    /// シナリオロード前の先行ポーズにも使えます（設定適用前に
    /// シミュレーションが進んでしまう競合を避ける常套手段）。
    pub fn pause(&mut self, session: &mut Session) -> Result<(), RemoteError> {
        match self.state {
            RunState::Idle | RunState::Running => {
                self.send_checked(session, &Request::ControlPause, "pause")?;
                info!("ポーズしました (旧状態: {})", self.state.name());
                self.state = RunState::Paused;
                Ok(())
            }
            _ => Err(self.invalid("pause")),
        }
    }

    /// ポーズからシミュレーションを再開する
    ///
    /// start後のポーズからのみ有効です。先行ポーズ（start前）からの
    /// 再開は、再開すべき実行が存在しないため遷移エラーになります。
    pub fn resume(&mut self, session: &mut Session) -> Result<(), RemoteError> {
        if self.state != RunState::Paused || !self.started {
            return Err(self.invalid("resume"));
        }
        self.send_checked(session, &Request::ControlResume, "resume")?;
        info!("シミュレーションを再開しました");
        self.state = RunState::Running;
        Ok(())
    }

    /// make済みシナリオをロードする
    ///
    /// make前のシナリオは `ScenarioLoadFailure`、Paused以外からの呼び出しは
    /// `InvalidStateTransition` になります。
    pub fn load(&mut self, session: &mut Session, scenario: &Scenario) -> Result<(), RemoteError> {
        if self.state != RunState::Paused {
            return Err(self.invalid("load"));
        }
        let materialized = scenario.materialized().ok_or_else(|| {
            RemoteError::ScenarioLoadFailure(format!(
                "シナリオ '{}' はまだmakeされていません",
                scenario.name()
            ))
        })?;

        let request = Request::ScenarioLoad {
            path: materialized.path().to_string(),
        };
        let response = session.request(&request)?;
        if !response.ack {
            return Err(RemoteError::ScenarioLoadFailure(
                response.reason_or_default(),
            ));
        }

        info!("シナリオをロードしました: {}", scenario.name());
        self.state = RunState::Loaded;
        Ok(())
    }

    /// ロード済みシナリオを開始する
    pub fn start(&mut self, session: &mut Session) -> Result<(), RemoteError> {
        if self.state != RunState::Loaded {
            return Err(self.invalid("start"));
        }
        self.send_checked(session, &Request::ScenarioStart, "start")?;
        info!("シナリオを開始しました");
        self.state = RunState::Running;
        self.started = true;
        Ok(())
    }

    /// シナリオを停止する
    ///
    /// Stopped済みの場合はネットワーク往復なしのノーオペ成功です。
    pub fn stop(&mut self, session: &mut Session) -> Result<(), RemoteError> {
        match self.state {
            RunState::Stopped => Ok(()),
            RunState::Running | RunState::Paused => {
                self.send_checked(session, &Request::ScenarioStop, "stop")?;
                info!("シナリオを停止しました");
                self.state = RunState::Stopped;
                Ok(())
            }
            _ => Err(self.invalid("stop")),
        }
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::common::{Position3D, Quaternion, SimulatorEndpoint};
    use crate::remote::session::mock::ScriptedChannel;
    use crate::scenario::{Scenario, VehiclePlacement};

    fn open_session() -> Session {
        let mut session = Session::new(SimulatorEndpoint::new("localhost", 25252, "/opt/sim"));
        session
            .open_with(Box::new(ScriptedChannel::acking()))
            .unwrap();
        session
    }

    fn made_scenario(session: &mut Session) -> Scenario {
        let mut scenario = Scenario::new("italy", "demo");
        scenario
            .add_vehicle(VehiclePlacement::new(
                "ego",
                "etk800",
                "White",
                Position3D::new(237.90, -894.42, 246.10),
                Quaternion::new(0.0173, -0.0019, -0.6354, 0.7720),
            ))
            .unwrap();
        scenario.make(session).unwrap();
        scenario
    }

    #[test]
    fn test_start_requires_loaded() {
        let mut session = open_session();
        let mut control = RunControl::new();
        let result = control.start(&mut session);
        assert!(matches!(
            result,
            Err(RemoteError::InvalidStateTransition {
                from: "Idle",
                operation: "start"
            })
        ));
    }

    #[test]
    fn test_load_requires_made_scenario() {
        let mut session = open_session();
        let mut control = RunControl::new();
        control.pause(&mut session).unwrap();

        let scenario = Scenario::new("italy", "demo");
        let result = control.load(&mut session, &scenario);
        assert!(matches!(result, Err(RemoteError::ScenarioLoadFailure(_))));
        assert_eq!(control.state(), RunState::Paused);
    }

    #[test]
    fn test_full_transition_sequence() {
        let mut session = open_session();
        let mut control = RunControl::new();
        let scenario = made_scenario(&mut session);

        control.pause(&mut session).unwrap();
        assert_eq!(control.state(), RunState::Paused);
        control.load(&mut session, &scenario).unwrap();
        assert_eq!(control.state(), RunState::Loaded);
        control.start(&mut session).unwrap();
        assert_eq!(control.state(), RunState::Running);
        control.stop(&mut session).unwrap();
        assert_eq!(control.state(), RunState::Stopped);
    }

    #[test]
    fn test_stop_idempotent_when_stopped() {
        let mut session = open_session();
        let mut control = RunControl::new();
        let scenario = made_scenario(&mut session);

        control.pause(&mut session).unwrap();
        control.load(&mut session, &scenario).unwrap();
        control.start(&mut session).unwrap();
        control.stop(&mut session).unwrap();

        // 2回目のstopは往復なしのノーオペ成功
        session.close();
        assert!(control.stop(&mut session).is_ok());
        assert_eq!(control.state(), RunState::Stopped);
    }

    #[test]
    fn test_resume_before_start_is_invalid() {
        let mut session = open_session();
        let mut control = RunControl::new();
        control.pause(&mut session).unwrap();

        let result = control.resume(&mut session);
        assert!(matches!(
            result,
            Err(RemoteError::InvalidStateTransition {
                operation: "resume",
                ..
            })
        ));
    }

    #[test]
    fn test_pause_and_resume_while_running() {
        let mut session = open_session();
        let mut control = RunControl::new();
        let scenario = made_scenario(&mut session);

        control.pause(&mut session).unwrap();
        control.load(&mut session, &scenario).unwrap();
        control.start(&mut session).unwrap();

        control.pause(&mut session).unwrap();
        assert_eq!(control.state(), RunState::Paused);
        control.resume(&mut session).unwrap();
        assert_eq!(control.state(), RunState::Running);
    }

    #[test]
    fn test_simulator_nack_surfaces_as_transition_error() {
        use crate::remote::transport::{Response, PROTOCOL_VERSION};

        let mut session = Session::new(SimulatorEndpoint::new("localhost", 25252, "/opt/sim"));
        let channel = ScriptedChannel::with_responses(vec![
            Response {
                ack: true,
                protocol_version: Some(PROTOCOL_VERSION),
                ..Response::default()
            },
            Response::rejected("cannot pause now"),
        ]);
        session.open_with(Box::new(channel)).unwrap();

        let mut control = RunControl::new();
        let result = control.pause(&mut session);
        assert!(matches!(
            result,
            Err(RemoteError::InvalidStateTransition { .. })
        ));
        // 拒否された遷移は状態を変えない
        assert_eq!(control.state(), RunState::Idle);
    }
}
