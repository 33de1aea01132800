use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// セッションプランのメタデータ
#[derive(Debug, Deserialize, Serialize)]
pub struct PlanMeta {
    pub version: String,
    pub name: String,
    pub description: String,
}

/// シミュレータの接続先設定
#[derive(Debug, Deserialize, Serialize)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
    /// シミュレータのインストールディレクトリ
    pub home: String,
}

/// プロセス起動の設定
#[derive(Debug, Deserialize, Serialize)]
pub struct LaunchConfig {
    /// trueならシミュレータを子プロセスとして起動する
    pub enabled: bool,
    /// ユーザデータディレクトリ
    pub user_dir: String,
    /// 制御ポートの受け付け待ちタイムアウト（秒）
    pub ready_timeout_s: f64,
    /// 追加の起動引数
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// 車両配置の設定
#[derive(Debug, Deserialize, Serialize)]
pub struct VehicleConfig {
    pub id: String,
    pub model: String,
    pub color: String,
    pub pos: PositionConfig,
    pub rot_quat: QuaternionConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PositionConfig {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct QuaternionConfig {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

/// シナリオの設定
#[derive(Debug, Deserialize, Serialize)]
pub struct ScenarioSection {
    pub level: String,
    pub name: String,
    pub vehicles: Vec<VehicleConfig>,
}

/// 決定論モードの設定
#[derive(Debug, Deserialize, Serialize)]
pub struct DeterminismConfig {
    pub steps_per_second: u32,
}

/// 設定変更1件
#[derive(Debug, Deserialize, Serialize)]
pub struct SettingEntry {
    pub key: String,
    pub value: String,
}

/// 完全なセッションプラン
///
/// 1回のリモート制御セッションで実行する内容（接続先、起動方法、
/// シナリオ、決定論モード、設定バッチの列）をYAMLで記述したものです。
#[derive(Debug, Deserialize, Serialize)]
pub struct SessionPlan {
    pub meta: PlanMeta,
    pub endpoint: EndpointConfig,
    pub launch: LaunchConfig,
    pub scenario: ScenarioSection,
    pub determinism: DeterminismConfig,
    pub settings_batches: Vec<Vec<SettingEntry>>,
}

impl SessionPlan {
    /// YAMLファイルからセッションプランを読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PlanError> {
        let path = path.as_ref();

        // ファイル存在チェック
        if !path.exists() {
            return Err(PlanError::FileNotFound(path.to_path_buf()));
        }

        // ファイル読み込み
        let contents =
            fs::read_to_string(path).map_err(|e| PlanError::IoError(path.to_path_buf(), e))?;

        // YAML解析
        let plan: SessionPlan = serde_yaml::from_str(&contents)
            .map_err(|e| PlanError::ParseError(path.to_path_buf(), e))?;

        // 基本的な検証
        plan.validate()?;

        Ok(plan)
    }

    /// 設定の基本的な検証
    pub fn validate(&self) -> Result<(), PlanError> {
        // 接続先の検証
        if self.endpoint.host.is_empty() {
            return Err(PlanError::ValidationError("host must not be empty".to_string()));
        }
        if self.endpoint.port == 0 {
            return Err(PlanError::ValidationError("port must be positive".to_string()));
        }

        // 起動設定の検証
        if self.launch.enabled && self.launch.ready_timeout_s <= 0.0 {
            return Err(PlanError::ValidationError(
                "ready_timeout_s must be positive".to_string(),
            ));
        }

        // 決定論モードの検証
        if self.determinism.steps_per_second == 0 {
            return Err(PlanError::ValidationError(
                "steps_per_second must be positive".to_string(),
            ));
        }

        // 車両IDの一意性検証
        for (i, vehicle) in self.scenario.vehicles.iter().enumerate() {
            if self.scenario.vehicles[..i].iter().any(|v| v.id == vehicle.id) {
                return Err(PlanError::ValidationError(format!(
                    "duplicate vehicle id: {}",
                    vehicle.id
                )));
            }
        }

        // 設定バッチの検証
        for (i, batch) in self.settings_batches.iter().enumerate() {
            for entry in batch {
                if entry.key.is_empty() {
                    return Err(PlanError::ValidationError(format!(
                        "empty setting key in batch {}",
                        i + 1
                    )));
                }
            }
        }

        Ok(())
    }

    /// プランの概要を表示
    pub fn print_summary(&self) {
        println!("=== セッションプラン情報 ===");
        println!("名前: {}", self.meta.name);
        println!("説明: {}", self.meta.description);
        println!("バージョン: {}", self.meta.version);
        println!();

        println!("=== 接続先 ===");
        println!("ホスト: {}:{}", self.endpoint.host, self.endpoint.port);
        println!("インストール先: {}", self.endpoint.home);
        println!(
            "プロセス起動: {}",
            if self.launch.enabled { "する" } else { "しない（既存プロセスへ接続）" }
        );
        println!();

        println!("=== シナリオ ===");
        println!("レベル: {}", self.scenario.level);
        println!("シナリオ名: {}", self.scenario.name);
        println!("車両数: {}台", self.scenario.vehicles.len());
        for vehicle in &self.scenario.vehicles {
            println!("  {}: {} ({})", vehicle.id, vehicle.model, vehicle.color);
        }
        println!();

        println!("=== 実行設定 ===");
        println!("ステップレート: {} steps/s", self.determinism.steps_per_second);
        println!("設定バッチ数: {}", self.settings_batches.len());
        for (i, batch) in self.settings_batches.iter().enumerate() {
            println!("  バッチ{}: {}件", i + 1, batch.len());
            for entry in batch {
                println!("    {} = {}", entry.key, entry.value);
            }
        }
    }
}

/// セッションプラン読み込みエラー
#[derive(Debug)]
pub enum PlanError {
    FileNotFound(std::path::PathBuf),
    IoError(std::path::PathBuf, std::io::Error),
    ParseError(std::path::PathBuf, serde_yaml::Error),
    ValidationError(String),
}

impl std::fmt::Display for PlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanError::FileNotFound(path) => {
                write!(f, "プランファイルが見つかりません: {}", path.display())
            }
            PlanError::IoError(path, err) => {
                write!(f, "ファイル読み込みエラー {}: {}", path.display(), err)
            }
            PlanError::ParseError(path, err) => {
                write!(f, "YAML解析エラー {}: {}", path.display(), err)
            }
            PlanError::ValidationError(msg) => {
                write!(f, "設定検証エラー: {}", msg)
            }
        }
    }
}

impl std::error::Error for PlanError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan() -> SessionPlan {
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
  enabled: true
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
    fn test_sample_plan_parses_and_validates() {
        let plan = sample_plan();
        assert!(plan.validate().is_ok());
        assert_eq!(plan.endpoint.port, 25252);
        assert_eq!(plan.scenario.vehicles.len(), 1);
        assert_eq!(plan.settings_batches.len(), 2);
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let mut plan = sample_plan();
        plan.endpoint.port = 0;
        assert!(matches!(plan.validate(), Err(PlanError::ValidationError(_))));
    }

    #[test]
    fn test_validate_rejects_duplicate_vehicle_id() {
        let mut plan = sample_plan();
        plan.scenario.vehicles.push(VehicleConfig {
            id: "ego".to_string(),
            model: "pickup".to_string(),
            color: "Red".to_string(),
            pos: PositionConfig { x: 0.0, y: 0.0, z: 0.0 },
            rot_quat: QuaternionConfig { x: 0.0, y: 0.0, z: 0.0, w: 1.0 },
        });
        assert!(matches!(plan.validate(), Err(PlanError::ValidationError(_))));
    }

    #[test]
    fn test_validate_rejects_zero_step_rate() {
        let mut plan = sample_plan();
        plan.determinism.steps_per_second = 0;
        assert!(matches!(plan.validate(), Err(PlanError::ValidationError(_))));
    }

    #[test]
    fn test_from_file_missing() {
        let result = SessionPlan::from_file("/nonexistent/plan.yaml");
        assert!(matches!(result, Err(PlanError::FileNotFound(_))));
    }
}
