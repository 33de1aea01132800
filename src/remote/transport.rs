//! # Transport モジュール
//!
//! シミュレータの制御リスナーと交換する要求/応答の型と、
//! TCP上のフレーム化チャンネル実装を提供します。
//!
//! ワイヤ形式は「4バイトのビッグエンディアン長プレフィックス + JSON本文」の
//! 単純なフレームです。要求は `cmd` フィールドでコマンド名を判別し、
//! 応答は `ack` フラグと任意の `reason` / `rejected_keys` を持ちます。
//! 応答のJSONが解析できない場合は `ProtocolMismatch` として扱います。

use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::remote::error::RemoteError;
use crate::remote::traits::IControlChannel;

/// フレーム本文の上限サイズ
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// このクライアントが話すプロトコルのバージョン
pub const PROTOCOL_VERSION: u32 = 1;

/// 車両のスポーン指定（ワイヤ表現）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSpawn {
    pub id: String,
    pub model: String,
    pub color: String,
    pub pos: [f64; 3],
    pub rot_quat: [f64; 4],
}

/// 制御リスナーへの要求
///
/// `cmd` フィールドにコマンド名が入るタグ付き表現です。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Request {
    #[serde(rename = "connect")]
    Connect { client: String, protocol_version: u32 },
    #[serde(rename = "scenario.make")]
    ScenarioMake {
        level: String,
        name: String,
        vehicles: Vec<VehicleSpawn>,
    },
    #[serde(rename = "scenario.load")]
    ScenarioLoad { path: String },
    #[serde(rename = "scenario.start")]
    ScenarioStart,
    #[serde(rename = "scenario.stop")]
    ScenarioStop,
    #[serde(rename = "control.pause")]
    ControlPause,
    #[serde(rename = "control.resume")]
    ControlResume,
    #[serde(rename = "settings.change")]
    SettingsChange { key: String, value: String },
    #[serde(rename = "settings.apply")]
    SettingsApply,
    #[serde(rename = "settings.setDeterministic")]
    SettingsSetDeterministic { steps_per_second: u32 },
}

impl Request {
    /// ログ出力用のコマンド名
    pub fn command_name(&self) -> &'static str {
        match self {
            Request::Connect { .. } => "connect",
            Request::ScenarioMake { .. } => "scenario.make",
            Request::ScenarioLoad { .. } => "scenario.load",
            Request::ScenarioStart => "scenario.start",
            Request::ScenarioStop => "scenario.stop",
            Request::ControlPause => "control.pause",
            Request::ControlResume => "control.resume",
            Request::SettingsChange { .. } => "settings.change",
            Request::SettingsApply => "settings.apply",
            Request::SettingsSetDeterministic { .. } => "settings.setDeterministic",
        }
    }
}

/// 制御リスナーからの応答
///
/// 成功時は `ack: true`。失敗時は `reason` に理由文字列が入り、
/// 設定適用の失敗時のみ `rejected_keys` に拒否されたキーの一覧が入ります。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub ack: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_path: Option<String>,
}

impl Response {
    /// 成功応答
    pub fn ok() -> Self {
        Response {
            ack: true,
            ..Response::default()
        }
    }

    /// 理由つきの失敗応答
    pub fn rejected(reason: impl Into<String>) -> Self {
        Response {
            ack: false,
            reason: Some(reason.into()),
            ..Response::default()
        }
    }

    /// 失敗時の理由文字列（未設定なら固定文言）
    pub fn reason_or_default(&self) -> String {
        self.reason
            .clone()
            .unwrap_or_else(|| "理由は報告されませんでした".to_string())
    }
}

/// TCP上のフレーム化制御チャンネル
///
/// ソケットの保持と解放のみを責務とし、コマンドの意味づけは
/// 上位層（Session / RunControl / Settings）が行います。
pub struct TcpControlChannel {
    stream: Option<TcpStream>,
    peer: String,
}

impl TcpControlChannel {
    /// 指定アドレスへ接続してチャンネルを確立
    ///
    /// 接続拒否は `ConnectionRefused`、それ以外の入出力エラーは
    /// `Transport` として返します。
    pub fn connect(host: &str, port: u16) -> Result<Self, RemoteError> {
        let addr = format!("{}:{}", host, port);
        let stream = TcpStream::connect(&addr).map_err(|e| {
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                RemoteError::ConnectionRefused(addr.clone())
            } else {
                RemoteError::Transport(e)
            }
        })?;

        // 要求/応答プロトコルなので遅延を避ける
        stream.set_nodelay(true)?;

        Ok(Self {
            stream: Some(stream),
            peer: addr,
        })
    }

    /// 応答待ちの読み取りタイムアウトを設定
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), RemoteError> {
        if let Some(stream) = &self.stream {
            stream.set_read_timeout(timeout)?;
        }
        Ok(())
    }

    /// 接続先アドレス
    pub fn peer(&self) -> &str {
        &self.peer
    }

    fn send_frame(stream: &mut TcpStream, body: &[u8]) -> Result<(), RemoteError> {
        let len = body.len() as u32;
        stream.write_all(&len.to_be_bytes())?;
        stream.write_all(body)?;
        stream.flush()?;
        Ok(())
    }

    fn recv_frame(stream: &mut TcpStream) -> Result<Vec<u8>, RemoteError> {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf);
        if len > MAX_FRAME_LEN {
            return Err(RemoteError::ProtocolMismatch(format!(
                "フレーム長が上限を超えています: {} bytes",
                len
            )));
        }
        let mut body = vec![0u8; len as usize];
        stream.read_exact(&mut body)?;
        Ok(body)
    }
}

impl IControlChannel for TcpControlChannel {
    fn request(&mut self, request: &Request) -> Result<Response, RemoteError> {
        let stream = self.stream.as_mut().ok_or(RemoteError::SessionClosed)?;

        let body = serde_json::to_vec(request)
            .map_err(|e| RemoteError::ProtocolMismatch(format!("要求の直列化に失敗: {}", e)))?;
        Self::send_frame(stream, &body)?;

        let reply = Self::recv_frame(stream)?;
        let response: Response = serde_json::from_slice(&reply).map_err(|e| {
            RemoteError::ProtocolMismatch(format!(
                "応答の解析に失敗 ({}): {}",
                request.command_name(),
                e
            ))
        })?;

        Ok(response)
    }

    fn shutdown(&mut self) {
        if let Some(stream) = self.stream.take() {
            // 片付け経路では失敗しても報告のみ
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}
