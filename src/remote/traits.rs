use crate::remote::error::RemoteError;
use crate::remote::transport::{Request, Response};

/// 制御チャンネルの基本インターフェース
///
/// シミュレータとの要求/応答交換を1回行います。実装はTCP上のフレーム化
/// チャンネル（`TcpControlChannel`）ですが、プロトコル層のテストでは
/// スクリプト化したモック実装に差し替えます。
///
/// すべての呼び出しは同期・ブロッキングで、同一チャンネルに対する
/// 並行呼び出しは想定していません。
pub trait IControlChannel {
    /// 要求を送信し、対応する応答を1件受信する
    fn request(&mut self, request: &Request) -> Result<Response, RemoteError>;

    /// チャンネルを解放する
    ///
    /// 冪等であること。解放済みチャンネルへの呼び出しは何もしません。
    fn shutdown(&mut self);
}
