pub mod document;
pub mod error;
pub mod extract;
pub mod geodesy;
pub mod model;
pub mod parser;
pub mod session;
pub mod transform;
pub mod writer;
pub mod zip_handler;

pub use document::{KmzDocument, Loaded};
pub use error::{
    BatchError, ExtractionError, GeodesyError, InvalidExtensionError, LoadError, SaveError,
    SessionError, TranslationError, Warning,
};
pub use extract::{BatchPoint, Extraction, Extractor, ExtractorRegistry, TxtExtractor};
pub use geodesy::{distance, DistanceCalculator, Ellipsoid};
pub use model::{DistanceRecord, Kml, Placemark, PointRecord};
pub use session::{BatchReport, Datum, Session};
pub use transform::{transform, DEFAULT_DATUM};
pub use writer::KmlWriter;
pub use zip_handler::ZipHandler;
