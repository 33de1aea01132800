use std::fmt;
use std::path::PathBuf;

/// 3次元位置を表す構造体
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position3D {
    pub x: f64, // m
    pub y: f64, // m
    pub z: f64, // m (altitude)
}

impl Position3D {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// 姿勢（回転）を表すクォータニオン
///
/// シミュレータの車両配置APIは (x, y, z, w) 順のクォータニオンを受け取ります。
/// 値の解釈はシミュレータ側の責務で、この層では保持して渡すだけです。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }
}

/// シミュレータへの接続先を表す構造体
///
/// 制御チャンネルの接続先（host:port）と、シナリオアセット解決に必要な
/// インストールディレクトリを保持します。作成後は不変です。
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorEndpoint {
    /// 制御リスナーのホスト名
    pub host: String,
    /// 制御リスナーのポート番号
    pub port: u16,
    /// シミュレータのインストールディレクトリ
    pub install_root: PathBuf,
}

impl SimulatorEndpoint {
    pub fn new(host: impl Into<String>, port: u16, install_root: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            port,
            install_root: install_root.into(),
        }
    }

    /// `host:port` 形式のアドレス文字列
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for SimulatorEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_address() {
        let ep = SimulatorEndpoint::new("localhost", 25252, "/opt/sim");
        assert_eq!(ep.address(), "localhost:25252");
        assert_eq!(format!("{}", ep), "localhost:25252");
    }
}
