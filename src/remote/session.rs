//! # Session モジュール
//!
//! 実行中のシミュレータへの論理的な制御チャンネル（セッション）を管理します。
//!
//! セッションは単一ライタの規律で運用します。同じ接続先に対して同時に
//! 開けるセッションは1つだけで、重なり合うスコープの併用は未定義です
//! （呼び出し側の責任で避けます）。
//!
//! ## スコープ付き利用
//!
//! `scope` はスコープに入るときに接続が開いていることを保証し、
//! 正常終了・エラーのどちらで抜けても解放をちょうど1回行います。
//! 解放済みセッションの `close` は何度呼んでも安全です。

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::remote::common::SimulatorEndpoint;
use crate::remote::error::RemoteError;
use crate::remote::traits::IControlChannel;
use crate::remote::transport::{Request, Response, TcpControlChannel, PROTOCOL_VERSION};

/// 応答待ちの既定タイムアウト
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// セッションの接続状態
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConnectionState {
    /// 切断
    Closed,
    /// 接続中
    Open,
}

/// シミュレータへの論理制御チャンネル
///
/// 下位のソケットを保持するかどうかのみを管理し、シナリオや設定の
/// 操作は上位層がこのセッション経由で要求を送ることで行います。
pub struct Session {
    endpoint: SimulatorEndpoint,
    channel: Option<Box<dyn IControlChannel>>,
}

impl Session {
    /// 切断状態のセッションを作成
    pub fn new(endpoint: SimulatorEndpoint) -> Self {
        Self {
            endpoint,
            channel: None,
        }
    }

    /// 接続先
    pub fn endpoint(&self) -> &SimulatorEndpoint {
        &self.endpoint
    }

    /// 現在の接続状態
    pub fn connection_state(&self) -> ConnectionState {
        if self.channel.is_some() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    /// 接続中かどうか
    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    /// 接続を開いてハンドシェイクを行う
    ///
    /// 既に開いている場合は何もしません。接続先でリッスンしていなければ
    /// `ConnectionRefused`、ハンドシェイク応答が不正なら `ProtocolMismatch`
    /// を返します。
    pub fn open(&mut self) -> Result<(), RemoteError> {
        if self.channel.is_some() {
            return Ok(());
        }

        info!("セッションを開きます: {}", self.endpoint);
        let mut channel = TcpControlChannel::connect(&self.endpoint.host, self.endpoint.port)?;
        channel.set_read_timeout(Some(DEFAULT_REQUEST_TIMEOUT))?;
        debug!("TCP接続確立: {}", channel.peer());
        self.open_with(Box::new(channel))
    }

    /// 確立済みチャンネル上でハンドシェイクを行い、セッションを開く
    ///
    /// プロトコル層のテストではモックチャンネルをここへ渡します。
    pub fn open_with(&mut self, mut channel: Box<dyn IControlChannel>) -> Result<(), RemoteError> {
        let hello = Request::Connect {
            client: "simctl".to_string(),
            protocol_version: PROTOCOL_VERSION,
        };
        let response = channel.request(&hello)?;

        if !response.ack {
            return Err(RemoteError::ProtocolMismatch(response.reason_or_default()));
        }
        match response.protocol_version {
            Some(PROTOCOL_VERSION) => {}
            Some(other) => {
                return Err(RemoteError::ProtocolMismatch(format!(
                    "プロトコルバージョンが一致しません: {} (期待値: {})",
                    other, PROTOCOL_VERSION
                )));
            }
            None => {
                return Err(RemoteError::ProtocolMismatch(
                    "応答にプロトコルバージョンがありません".to_string(),
                ));
            }
        }

        debug!("ハンドシェイク完了: {}", self.endpoint);
        self.channel = Some(channel);
        Ok(())
    }

    /// 要求を送信して応答を受け取る
    ///
    /// セッションが開いていなければ `SessionClosed` を返します。
    pub fn request(&mut self, request: &Request) -> Result<Response, RemoteError> {
        let channel = self.channel.as_mut().ok_or(RemoteError::SessionClosed)?;
        debug!("要求送信: {}", request.command_name());
        channel.request(request)
    }

    /// 接続を解放する（冪等）
    ///
    /// 片付け経路から無条件に呼べるよう、エラーを返しません。
    /// 2回目以降の呼び出しは何もしません。
    pub fn close(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.shutdown();
            info!("セッションを閉じました: {}", self.endpoint);
        }
    }

    /// スコープ付きでセッションを利用する
    ///
    /// 入るときに接続が開いていることを保証し（閉じていれば開く）、
    /// 本体が正常終了してもエラーでも、抜けるときに解放をちょうど1回
    /// 行います。解放後に再度 `scope` / `open` で開き直すことは可能ですが、
    /// 同じセッションに対する入れ子のスコープは未定義です。
    pub fn scope<T, F>(&mut self, f: F) -> Result<T, RemoteError>
    where
        F: FnOnce(&mut Session) -> Result<T, RemoteError>,
    {
        self.open()?;
        let result = f(self);
        self.close();
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.is_open() {
            warn!("セッションが開いたまま破棄されました。解放します: {}", self.endpoint);
            self.close();
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! プロトコル層テスト用のスクリプト化チャンネル

    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use crate::remote::error::RemoteError;
    use crate::remote::traits::IControlChannel;
    use crate::remote::transport::{Request, Response, PROTOCOL_VERSION};

    /// 受信した要求を記録し、台本どおりの応答を返すモックチャンネル
    pub struct ScriptedChannel {
        pub sent: Vec<Request>,
        /// 外部と共有する要求ログ（チャンネルがセッションへ移った後も参照できる）
        log: Option<Rc<RefCell<Vec<Request>>>>,
        responses: VecDeque<Response>,
        fallback_ack: bool,
        pub shutdown_count: usize,
    }

    impl ScriptedChannel {
        /// すべての要求に成功応答を返すチャンネル
        pub fn acking() -> Self {
            Self {
                sent: Vec::new(),
                log: None,
                responses: VecDeque::new(),
                fallback_ack: true,
                shutdown_count: 0,
            }
        }

        /// 成功応答を返しつつ、共有ログへ要求を記録するチャンネル
        pub fn acking_logged(log: Rc<RefCell<Vec<Request>>>) -> Self {
            Self {
                log: Some(log),
                ..Self::acking()
            }
        }

        /// 台本（応答列）を先頭から消費するチャンネル
        ///
        /// 台本が尽きた後は成功応答を返します。
        pub fn with_responses(responses: Vec<Response>) -> Self {
            Self {
                sent: Vec::new(),
                log: None,
                responses: responses.into(),
                fallback_ack: true,
                shutdown_count: 0,
            }
        }

        /// 台本を消費しつつ、共有ログへ要求を記録するチャンネル
        pub fn with_responses_logged(
            responses: Vec<Response>,
            log: Rc<RefCell<Vec<Request>>>,
        ) -> Self {
            Self {
                log: Some(log),
                ..Self::with_responses(responses)
            }
        }

        fn default_response(request: &Request) -> Response {
            match request {
                Request::Connect { .. } => Response {
                    ack: true,
                    protocol_version: Some(PROTOCOL_VERSION),
                    ..Response::default()
                },
                Request::ScenarioMake { level, name, .. } => Response {
                    ack: true,
                    scenario_path: Some(format!("levels/{}/scenarios/{}.json", level, name)),
                    ..Response::default()
                },
                _ => Response::ok(),
            }
        }
    }

    impl IControlChannel for ScriptedChannel {
        fn request(&mut self, request: &Request) -> Result<Response, RemoteError> {
            self.sent.push(request.clone());
            if let Some(log) = &self.log {
                log.borrow_mut().push(request.clone());
            }
            if let Some(scripted) = self.responses.pop_front() {
                return Ok(scripted);
            }
            if self.fallback_ack {
                Ok(Self::default_response(request))
            } else {
                Ok(Response::rejected("台本にない要求です"))
            }
        }

        fn shutdown(&mut self) {
            self.shutdown_count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::ScriptedChannel;
    use super::*;

    fn test_endpoint() -> SimulatorEndpoint {
        SimulatorEndpoint::new("localhost", 25252, "/opt/simulator")
    }

    fn open_session() -> Session {
        let mut session = Session::new(test_endpoint());
        session
            .open_with(Box::new(ScriptedChannel::acking()))
            .unwrap();
        session
    }

    #[test]
    fn test_handshake_success() {
        let session = open_session();
        assert_eq!(session.connection_state(), ConnectionState::Open);
    }

    #[test]
    fn test_handshake_nack_is_protocol_mismatch() {
        let mut session = Session::new(test_endpoint());
        let channel = ScriptedChannel::with_responses(vec![Response::rejected("unsupported")]);
        let result = session.open_with(Box::new(channel));
        assert!(matches!(result, Err(RemoteError::ProtocolMismatch(_))));
        assert_eq!(session.connection_state(), ConnectionState::Closed);
    }

    #[test]
    fn test_handshake_missing_version_is_protocol_mismatch() {
        let mut session = Session::new(test_endpoint());
        let channel = ScriptedChannel::with_responses(vec![Response::ok()]);
        let result = session.open_with(Box::new(channel));
        assert!(matches!(result, Err(RemoteError::ProtocolMismatch(_))));
    }

    #[test]
    fn test_handshake_wrong_version_is_protocol_mismatch() {
        let mut session = Session::new(test_endpoint());
        let channel = ScriptedChannel::with_responses(vec![Response {
            ack: true,
            protocol_version: Some(99),
            ..Response::default()
        }]);
        let result = session.open_with(Box::new(channel));
        assert!(matches!(result, Err(RemoteError::ProtocolMismatch(_))));
    }

    #[test]
    fn test_request_on_closed_session() {
        let mut session = Session::new(test_endpoint());
        let result = session.request(&Request::ControlPause);
        assert!(matches!(result, Err(RemoteError::SessionClosed)));
    }

    #[test]
    fn test_close_twice_is_noop() {
        let mut session = open_session();
        session.close();
        assert_eq!(session.connection_state(), ConnectionState::Closed);
        // 2回目はノーオペであり、決してエラーにならない
        session.close();
        assert_eq!(session.connection_state(), ConnectionState::Closed);
    }

    #[test]
    fn test_scope_releases_on_success() {
        let mut session = open_session();
        let result = session.scope(|s| s.request(&Request::ControlPause));
        assert!(result.is_ok());
        assert_eq!(session.connection_state(), ConnectionState::Closed);
    }

    #[test]
    fn test_scope_releases_on_failure() {
        let mut session = open_session();
        let result: Result<(), RemoteError> = session.scope(|_| Err(RemoteError::SessionClosed));
        assert!(result.is_err());
        // エラーで抜けても解放はちょうど1回行われる
        assert_eq!(session.connection_state(), ConnectionState::Closed);
    }
}
