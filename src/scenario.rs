//! # Scenario モジュール
//!
//! クライアント側で組み立てる走行シナリオと、そのマテリアライズ（make）を
//! 提供します。シナリオはレベル名・シナリオ名と車両配置の集合からなり、
//! make によってシミュレータがロード可能な形式に変換されます。
//!
//! レベルや車両モデルといったアセットの解決はシミュレータ側の責務で、
//! この層では行いません。
//!
//! ## 順序規則
//!
//! 車両の追加は make より前に行います。make は開いたセッションに対して、
//! シナリオインスタンスごとにちょうど1回だけ呼び出せます。

use tracing::{debug, info};

use crate::remote::common::{Position3D, Quaternion};
use crate::remote::error::RemoteError;
use crate::remote::session::Session;
use crate::remote::transport::{Request, VehicleSpawn};

/// シナリオ内の車両配置1件
///
/// `id` はシナリオ内で一意でなければなりません。
#[derive(Debug, Clone, PartialEq)]
pub struct VehiclePlacement {
    pub id: String,
    pub model: String,
    pub color: String,
    pub position: Position3D,
    pub orientation: Quaternion,
}

impl VehiclePlacement {
    pub fn new(
        id: impl Into<String>,
        model: impl Into<String>,
        color: impl Into<String>,
        position: Position3D,
        orientation: Quaternion,
    ) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            color: color.into(),
            position,
            orientation,
        }
    }

    /// ワイヤ表現へ変換
    pub fn to_spawn(&self) -> VehicleSpawn {
        VehicleSpawn {
            id: self.id.clone(),
            model: self.model.clone(),
            color: self.color.clone(),
            pos: [self.position.x, self.position.y, self.position.z],
            rot_quat: [
                self.orientation.x,
                self.orientation.y,
                self.orientation.z,
                self.orientation.w,
            ],
        }
    }
}

/// make済みシナリオの不透明な記述子
///
/// `load` が受け取る唯一の値で、中身（シミュレータ内のパス）を
/// クライアントが解釈することはありません。
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedScenario {
    path: String,
}

impl MaterializedScenario {
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// クライアント側のシナリオ記述
pub struct Scenario {
    level: String,
    name: String,
    vehicles: Vec<VehiclePlacement>,
    materialized: Option<MaterializedScenario>,
}

impl Scenario {
    pub fn new(level: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            name: name.into(),
            vehicles: Vec::new(),
            materialized: None,
        }
    }

    pub fn level(&self) -> &str {
        &self.level
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vehicles(&self) -> &[VehiclePlacement] {
        &self.vehicles
    }

    /// make済みなら記述子を返す
    pub fn materialized(&self) -> Option<&MaterializedScenario> {
        self.materialized.as_ref()
    }

    /// 車両をシナリオへ追加する
    ///
    /// `id` が既に存在する場合は `DuplicateVehicleId` を返し、
    /// 車両集合は変更されません。
    pub fn add_vehicle(&mut self, placement: VehiclePlacement) -> Result<(), RemoteError> {
        if self.vehicles.iter().any(|v| v.id == placement.id) {
            return Err(RemoteError::DuplicateVehicleId(placement.id));
        }
        debug!(
            "車両を追加: {} (model: {}, color: {})",
            placement.id, placement.model, placement.color
        );
        self.vehicles.push(placement);
        Ok(())
    }

    /// シナリオをシミュレータがロード可能な形式へマテリアライズする
    ///
    /// 開いたセッションに対して、インスタンスごとにちょうど1回だけ
    /// 呼び出せます。2回目の呼び出しと、シミュレータ側の失敗（未知の
    /// レベル、不正なアセットパスなど）は `ScenarioMakeFailure` です。
    pub fn make(&mut self, session: &mut Session) -> Result<&MaterializedScenario, RemoteError> {
        if self.materialized.is_some() {
            return Err(RemoteError::ScenarioMakeFailure(format!(
                "シナリオ '{}' は既にmake済みです",
                self.name
            )));
        }

        let request = Request::ScenarioMake {
            level: self.level.clone(),
            name: self.name.clone(),
            vehicles: self.vehicles.iter().map(|v| v.to_spawn()).collect(),
        };
        let response = session.request(&request)?;
        if !response.ack {
            return Err(RemoteError::ScenarioMakeFailure(
                response.reason_or_default(),
            ));
        }
        let path = response.scenario_path.ok_or_else(|| {
            RemoteError::ScenarioMakeFailure("応答にシナリオパスがありません".to_string())
        })?;

        info!("シナリオをmakeしました: {} ({})", self.name, path);
        Ok(self.materialized.insert(MaterializedScenario { path }))
    }
}
