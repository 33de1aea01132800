//! # simctl
//!
//! 車両物理シミュレータのリモート制御クライアント。
//!
//! シミュレータプロセスの起動（または既存プロセスへの接続）、走行シナリオの
//! 構築とロード、実行中の設定バッチ適用、そして失敗時も保証される後始末までの
//! セッション一式を、セッションプラン（YAML）に従って実行します。
//!
//! シミュレータ本体の物理・描画エンジン、シナリオアセットの解決、および
//! ワイヤプロトコルの意味づけはシミュレータ側の責務で、このクレートは
//! 要求/応答の順序づけとライフサイクル管理のみを担います。

pub mod logging;
pub mod orchestration;
pub mod plan;
pub mod remote;
pub mod scenario;

pub use orchestration::SessionOrchestrator;
pub use plan::{PlanError, SessionPlan};
pub use remote::{
    ConnectionState, Position3D, ProcessState, Quaternion, RemoteError, RunControl, RunState,
    Session, Settings, SimulatorEndpoint, SimulatorProcess,
};
pub use scenario::{MaterializedScenario, Scenario, VehiclePlacement};
