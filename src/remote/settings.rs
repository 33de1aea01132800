//! # Settings モジュール
//!
//! 設定変更の二相書き込み（ステージ → apply）を行う同期化レイヤです。
//!
//! `change` はローカルのバッチに積むだけでネットワーク入出力を行いません。
//! `apply` がバッチ全体を1つの論理操作としてフラッシュし、成功時のみ
//! バッチをクリアします。キーの検証はこの層では行わず、シミュレータが
//! 設定スキーマの権威です。未知のキーは `apply` 時に初めて表面化します。
//!
//! ## バッチ内の順序
//!
//! 同一バッチ内での `change` の相対順序に意味はありません。同じキーを
//! apply前に2回設定した場合、最後の値だけが送信されます（キー単位の
//! 後勝ち）。FIFOの逐次適用を期待しないでください。

use tracing::{debug, info};

use crate::remote::error::RemoteError;
use crate::remote::session::Session;
use crate::remote::transport::Request;

/// 未適用の設定変更1件
#[derive(Debug, Clone, PartialEq)]
pub struct SettingChange {
    pub key: String,
    pub value: String,
}

/// 設定同期化レイヤ
///
/// 前回のapply成功以降に積まれた変更の列を保持します。
pub struct Settings {
    staged: Vec<SettingChange>,
}

impl Settings {
    pub fn new() -> Self {
        Self { staged: Vec::new() }
    }

    /// 設定変更をバッチに積む
    ///
    /// 純粋なローカル操作で、ネットワーク入出力は発生しません。
    /// キー・値の内容検証もここでは行いません。
    pub fn change(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let change = SettingChange {
            key: key.into(),
            value: value.into(),
        };
        debug!("設定変更をステージ: {} = {}", change.key, change.value);
        self.staged.push(change);
    }

    /// 現在ステージされている変更の列
    pub fn staged(&self) -> &[SettingChange] {
        &self.staged
    }

    /// バッチが空かどうか
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// キー単位の後勝ちでフラッシュ対象を引き当てる
    fn effective_changes(&self) -> Vec<SettingChange> {
        let mut effective: Vec<SettingChange> = Vec::new();
        for change in &self.staged {
            if let Some(existing) = effective.iter_mut().find(|c| c.key == change.key) {
                existing.value = change.value.clone();
            } else {
                effective.push(change.clone());
            }
        }
        effective
    }

    /// バッチをシミュレータへフラッシュする
    ///
    /// 空バッチの場合はネットワーク往復なしのノーオペ成功です。
    /// キーが1つでも拒否された場合は `SettingsApplyFailure` を返し、
    /// バッチはクリアせず保持します（無関係な変更を失わずに修正・再試行
    /// できるようにするため）。拒否は原子的で、どのキーも反映されません。
    pub fn apply(&mut self, session: &mut Session) -> Result<(), RemoteError> {
        if self.staged.is_empty() {
            debug!("設定バッチが空のためapplyをスキップします");
            return Ok(());
        }

        let effective = self.effective_changes();
        let mut rejected_keys: Vec<String> = Vec::new();

        for change in &effective {
            let request = Request::SettingsChange {
                key: change.key.clone(),
                value: change.value.clone(),
            };
            let response = session.request(&request)?;
            if !response.ack {
                rejected_keys.push(change.key.clone());
            }
        }

        // キーが拒否された時点でapplyは送らない。送ってしまうと有効なキーだけが
        // シミュレータ側で確定し、原子的拒否が破れる
        if !rejected_keys.is_empty() {
            return Err(RemoteError::SettingsApplyFailure { rejected_keys });
        }

        let response = session.request(&Request::SettingsApply)?;
        if !response.ack {
            let rejected_keys = response
                .rejected_keys
                .unwrap_or_else(|| effective.iter().map(|c| c.key.clone()).collect());
            return Err(RemoteError::SettingsApplyFailure { rejected_keys });
        }

        info!("設定バッチを適用しました ({}件)", effective.len());
        self.staged.clear();
        Ok(())
    }

    /// シミュレーションの固定ステップレートを設定する
    ///
    /// ステージと即時applyの対をなす高水準の便宜操作です。ローカルの
    /// バッチには触れません。決定論モードはシナリオの `start` より前に
    /// 設定しなければなりません。実行中のステップレート変更はシミュレータ
    /// 側で未定義のため、この層では扱いません。
    pub fn set_deterministic(
        &mut self,
        session: &mut Session,
        steps_per_second: u32,
    ) -> Result<(), RemoteError> {
        let stage = Request::SettingsSetDeterministic { steps_per_second };
        let response = session.request(&stage)?;
        if !response.ack {
            return Err(RemoteError::SettingsApplyFailure {
                rejected_keys: vec!["SetDeterministic".to_string()],
            });
        }

        let response = session.request(&Request::SettingsApply)?;
        if !response.ack {
            return Err(RemoteError::SettingsApplyFailure {
                rejected_keys: response
                    .rejected_keys
                    .unwrap_or_else(|| vec!["SetDeterministic".to_string()]),
            });
        }

        info!("決定論モードを設定しました: {} steps/s", steps_per_second);
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}
