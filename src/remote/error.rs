/// リモート制御プロトコルのエラー
///
/// セッション確立からシナリオロード、設定適用までの各操作が返すエラーです。
/// 失敗はすべて呼び出し元へそのまま伝播し、内部で握りつぶされることは
/// ありません。唯一の部分失敗は `SettingsApplyFailure` で、拒否されたキーの
/// 一覧を保持します。
#[derive(Debug)]
pub enum RemoteError {
    /// シミュレータプロセスの起動に失敗
    LaunchFailure(String),
    /// 起動後、制御ポートが時間内に受け付け状態にならなかった
    StartupTimeout(std::time::Duration),
    /// 接続先でリッスンしているプロセスがいない
    ConnectionRefused(String),
    /// ハンドシェイク応答が不正
    ProtocolMismatch(String),
    /// シナリオ内で車両IDが重複
    DuplicateVehicleId(String),
    /// シナリオのマテリアライズ（make）に失敗
    ScenarioMakeFailure(String),
    /// シナリオのロードに失敗
    ScenarioLoadFailure(String),
    /// 実行制御の状態遷移が不正
    InvalidStateTransition {
        from: &'static str,
        operation: &'static str,
    },
    /// 設定適用の失敗（拒否されたキーの一覧つき、バッチは保持される）
    SettingsApplyFailure { rejected_keys: Vec<String> },
    /// 制御チャンネルの入出力エラー
    Transport(std::io::Error),
    /// セッションが開いていない状態での操作
    SessionClosed,
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteError::LaunchFailure(msg) => {
                write!(f, "シミュレータの起動に失敗しました: {}", msg)
            }
            RemoteError::StartupTimeout(timeout) => {
                write!(
                    f,
                    "制御ポートが {:.1}秒以内に受け付け状態になりませんでした",
                    timeout.as_secs_f64()
                )
            }
            RemoteError::ConnectionRefused(addr) => {
                write!(f, "接続が拒否されました: {}", addr)
            }
            RemoteError::ProtocolMismatch(msg) => {
                write!(f, "ハンドシェイク応答が不正です: {}", msg)
            }
            RemoteError::DuplicateVehicleId(id) => {
                write!(f, "車両IDが重複しています: {}", id)
            }
            RemoteError::ScenarioMakeFailure(msg) => {
                write!(f, "シナリオのマテリアライズに失敗しました: {}", msg)
            }
            RemoteError::ScenarioLoadFailure(msg) => {
                write!(f, "シナリオのロードに失敗しました: {}", msg)
            }
            RemoteError::InvalidStateTransition { from, operation } => {
                write!(f, "不正な状態遷移です: {} (現在状態: {})", operation, from)
            }
            RemoteError::SettingsApplyFailure { rejected_keys } => {
                write!(
                    f,
                    "設定の適用に失敗しました (拒否されたキー: {})",
                    rejected_keys.join(", ")
                )
            }
            RemoteError::Transport(err) => {
                write!(f, "制御チャンネルの入出力エラー: {}", err)
            }
            RemoteError::SessionClosed => {
                write!(f, "セッションが開いていません")
            }
        }
    }
}

impl std::error::Error for RemoteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RemoteError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RemoteError {
    fn from(err: std::io::Error) -> Self {
        RemoteError::Transport(err)
    }
}
