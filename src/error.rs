use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// 投影座標から経緯度への変換失敗
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("invalid zone label '{label}': {reason}")]
    InvalidZoneLabel { label: String, reason: String },

    #[error("zone {zone} has no UTM EPSG code (expected 1-60)")]
    UnsupportedZone { zone: u32 },

    #[error("failed to build projection for EPSG:{epsg}")]
    Projection {
        epsg: u32,
        #[source]
        source: proj4rs::errors::Error,
    },

    #[error("({x}, {y}) is outside the EPSG:{epsg} projection domain")]
    OutOfDomain { x: f64, y: f64, epsg: u32 },

    #[error("failed to transform ({x}, {y}) from EPSG:{epsg} to EPSG:4326")]
    Transform {
        x: f64,
        y: f64,
        epsg: u32,
        #[source]
        source: proj4rs::errors::Error,
    },
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("XML read error")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("document has no root element")]
    MissingRoot,

    #[error("unexpected root element <{0}>, expected <kml>")]
    UnexpectedRoot(String),

    #[error("unexpected end of file inside <{0}>")]
    UnexpectedEof(String),

    #[error("unexpected element <{found}> inside <{parent}>")]
    UnexpectedElement { parent: String, found: String },
}

/// XML書き出し時のエラー
///
/// quick-xml の `Writer` は I/O エラーを返すが、エスケープ等で
/// `quick_xml::Error` を返す経路もあるため両方を受ける。
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error while writing KML")]
    Io(#[from] io::Error),

    #[error("XML write error")]
    Xml(#[from] quick_xml::Error),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read KMZ archive")]
    Zip(#[from] zip::result::ZipError),

    #[error("no .kml entry found in {path}")]
    MissingKmlEntry { path: PathBuf },

    #[error("failed to read entry '{entry}'")]
    Entry {
        entry: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse KML document")]
    Parse(#[from] ParseError),
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("no file path provided to save the KMZ")]
    NoPath,

    #[error("failed to serialize KML document")]
    Serialize(#[from] WriteError),

    #[error("failed to write KMZ archive")]
    Zip(#[from] zip::result::ZipError),

    #[error("failed to write {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum GeodesyError {
    #[error("unknown ellipsoid '{0}'")]
    UnknownEllipsoid(String),
}

/// 座標リストファイルの読み込み失敗
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to read coordinate file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
#[error(
    "invalid file extension '{extension}' in file {path}; supported extensions are: {}",
    supported.join(", ")
)]
pub struct InvalidExtensionError {
    pub extension: String,
    pub path: PathBuf,
    pub supported: Vec<String>,
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    InvalidExtension(#[from] InvalidExtensionError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no KMZ loaded or created")]
    NoDocument,

    #[error("unsupported datum '{0}'; supported datums are: WGS84, NAD83, ETRS89")]
    UnsupportedDatum(String),

    #[error("at least two points are required to calculate distances, found {0}")]
    NotEnoughPoints(usize),

    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error(transparent)]
    Geodesy(#[from] GeodesyError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Save(#[from] SaveError),

    #[error(transparent)]
    Batch(#[from] BatchError),
}

/// 処理を止めない警告
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// 同名のPlacemarkが複数ある。名前での操作は先頭のものが対象になる
    DuplicateNames { names: Vec<String> },
    /// バッチファイルの読み飛ばした行
    MalformedLine {
        line_number: usize,
        line: String,
        reason: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::DuplicateNames { names } => write!(
                f,
                "duplicate placemark names found: {}. Updates and deletions target the first placemark with a matching name",
                names.join(", ")
            ),
            Warning::MalformedLine {
                line_number,
                line,
                reason,
            } => write!(f, "line {line_number} skipped ({reason}): {line}"),
        }
    }
}
