//! # Launcher モジュール
//!
//! シミュレータを子プロセスとして起動し、そのライフサイクル
//! （起動 → 受け付け待ち → 終了要求 → 回収）を管理します。
//!
//! 子プロセスには以下を指示する引数を渡します：
//!
//! - プラットフォームストア連携の無効化（`-nosteam`）
//! - 制御リスナーのバインド先ホスト（`-tcom-listen-ip`）
//! - 指定ポートで遠隔制御サーバを開くスクリプト起動コマンド（`-lua`）
//! - ユーザデータディレクトリ（`-userpath`）
//!
//! プロセスハンドルは起動した呼び出し元が排他的に所有し、同じ所有者が
//! `terminate` / `wait` で後始末します。後始末は冪等で、終了済みハンドルに
//! 対する呼び出しは何もしません（失敗後の片付け経路から無条件に呼べること）。

use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::remote::common::SimulatorEndpoint;
use crate::remote::error::RemoteError;

/// インストールディレクトリからの実行ファイル相対パス（既定値）
#[cfg(windows)]
const DEFAULT_BINARY: &str = "Bin64/BeamNG.drive.x64.exe";
#[cfg(not(windows))]
const DEFAULT_BINARY: &str = "Bin64/BeamNG.drive.x64";

/// 受け付け待ちポーリングの間隔
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// プロセスの状態
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProcessState {
    /// 未起動
    NotStarted,
    /// 実行中
    Running,
    /// 終了済み（回収済み）
    Terminated,
}

/// シミュレータ子プロセスのハンドル
///
/// 起動引数と子プロセスを保持します。シングルトンにはせず、
/// オーケストレーション側へ所有権ごと渡して使います。
pub struct SimulatorProcess {
    executable: PathBuf,
    arguments: Vec<String>,
    child: Option<Child>,
    state: ProcessState,
}

impl SimulatorProcess {
    /// 起動せずにハンドルだけを構築（引数の組み立てを含む）
    pub fn new(endpoint: &SimulatorEndpoint, user_dir: &str, extra_args: &[String]) -> Self {
        let executable = endpoint.install_root.join(DEFAULT_BINARY);
        let mut arguments = vec![
            "-nosteam".to_string(),
            "-tcom-listen-ip".to_string(),
            endpoint.host.clone(),
            "-lua".to_string(),
            format!(
                "extensions.load('tech/techCore');tech_techCore.openServer({})",
                endpoint.port
            ),
            "-userpath".to_string(),
            user_dir.to_string(),
        ];
        arguments.extend(extra_args.iter().cloned());

        Self {
            executable,
            arguments,
            child: None,
            state: ProcessState::NotStarted,
        }
    }

    /// シミュレータを子プロセスとして起動
    ///
    /// 実行ファイルが存在しない、またはOSが起動を拒否した場合は
    /// `LaunchFailure` を返します。
    pub fn launch(
        endpoint: &SimulatorEndpoint,
        user_dir: &str,
        extra_args: &[String],
    ) -> Result<Self, RemoteError> {
        let mut process = Self::new(endpoint, user_dir, extra_args);

        if !process.executable.exists() {
            return Err(RemoteError::LaunchFailure(format!(
                "実行ファイルが見つかりません: {}",
                process.executable.display()
            )));
        }

        info!("シミュレータを起動します: {}", process.executable.display());
        debug!("起動引数: {:?}", process.arguments);

        let child = Command::new(&process.executable)
            .args(&process.arguments)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| RemoteError::LaunchFailure(e.to_string()))?;

        info!("シミュレータプロセスを起動しました (pid: {})", child.id());
        process.child = Some(child);
        process.state = ProcessState::Running;
        Ok(process)
    }

    /// 制御ポートが接続を受け付けるまでブロックして待機
    ///
    /// `timeout` 以内に受け付け状態にならなければ `StartupTimeout` を返します。
    pub fn wait_until_ready(
        &mut self,
        endpoint: &SimulatorEndpoint,
        timeout: Duration,
    ) -> Result<(), RemoteError> {
        let deadline = Instant::now() + timeout;
        let addr = endpoint
            .address()
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| RemoteError::ConnectionRefused(endpoint.address()))?;

        info!(
            "制御ポートの受け付け待ち: {} (タイムアウト: {:.1}秒)",
            endpoint,
            timeout.as_secs_f64()
        );

        loop {
            match TcpStream::connect_timeout(&addr, READY_POLL_INTERVAL) {
                Ok(probe) => {
                    // 確認用の接続はすぐ捨てる
                    drop(probe);
                    debug!("制御ポートが受け付け状態になりました: {}", endpoint);
                    return Ok(());
                }
                Err(_) if Instant::now() < deadline => {
                    std::thread::sleep(READY_POLL_INTERVAL);
                }
                Err(_) => {
                    return Err(RemoteError::StartupTimeout(timeout));
                }
            }
        }
    }

    /// プロセスの現在状態
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// 終了を要求する（冪等）
    ///
    /// 既に終了済みの場合は何もしません。失敗は警告ログのみで、
    /// 片付け経路からエラーを返すことはありません。
    pub fn terminate(&mut self) {
        if let Some(child) = &mut self.child {
            match child.kill() {
                Ok(()) => info!("シミュレータへ終了を要求しました"),
                // 既に自力で終了していた場合もここに来る
                Err(e) => warn!("終了要求に失敗しました（無視します）: {}", e),
            }
        }
    }

    /// プロセスの終了を待って回収する（冪等）
    ///
    /// 回収後は状態が `Terminated` になります。終了コードは
    /// 「終了した」以上の意味では解釈しません。
    pub fn wait(&mut self) {
        if let Some(mut child) = self.child.take() {
            match child.wait() {
                Ok(status) => {
                    info!("シミュレータプロセスが終了しました: {}", status);
                }
                Err(e) => {
                    warn!("プロセス回収に失敗しました（無視します）: {}", e);
                }
            }
            self.state = ProcessState::Terminated;
        }
    }
}

impl Drop for SimulatorProcess {
    fn drop(&mut self) {
        // 所有者がwaitし忘れてもプロセスを取り残さない
        if self.child.is_some() {
            self.terminate();
            self.wait();
        }
    }
}
