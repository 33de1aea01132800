// 基本的なデータ型（位置・姿勢・接続先）
pub mod common;

// 制御チャンネルの基本インターフェース（trait）定義
pub mod traits;

// エラー分類
pub mod error;

// 各コンポーネントの実装
pub mod transport;
pub mod launcher;
pub mod session;
pub mod control;
pub mod settings;

// 便利な re-export
pub use common::{Position3D, Quaternion, SimulatorEndpoint};
pub use control::{RunControl, RunState};
pub use error::RemoteError;
pub use launcher::{ProcessState, SimulatorProcess};
pub use session::{ConnectionState, Session};
pub use settings::{SettingChange, Settings};
pub use traits::IControlChannel;
pub use transport::{Request, Response, TcpControlChannel, VehicleSpawn, PROTOCOL_VERSION};
