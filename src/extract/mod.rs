//! 座標リストファイルの読み込み
//!
//! 拡張子ごとに [`Extractor`] をひとつ、[`ExtractorRegistry`] に明示的に登録する。

mod txt;

use std::path::Path;

use tracing::info;

use crate::error::{BatchError, ExtractionError, InvalidExtensionError, Warning};

pub use txt::TxtExtractor;

/// バッチファイルから読んだ投影座標の点
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPoint {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub zone_label: String,
    /// 行ごとの測地系指定（省略時はセッションの既定値）
    pub datum: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Extraction {
    pub points: Vec<BatchPoint>,
    pub warnings: Vec<Warning>,
}

pub trait Extractor {
    /// ドットなしの小文字の拡張子（例: `"txt"`）
    fn supported_extension(&self) -> &'static str;

    fn extract(&self, path: &Path) -> Result<Extraction, ExtractionError>;
}

#[derive(Default)]
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 組み込みの読み込み処理を登録済みのもの
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(TxtExtractor));
        registry
    }

    /// 同じ拡張子が既にあれば置き換える
    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        let extension = extractor.supported_extension();
        self.extractors
            .retain(|e| e.supported_extension() != extension);
        self.extractors.push(extractor);
    }

    pub fn supported_extensions(&self) -> Vec<String> {
        self.extractors
            .iter()
            .map(|e| e.supported_extension().to_string())
            .collect()
    }

    pub fn extract(&self, path: &Path) -> Result<Extraction, BatchError> {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();

        let extractor = self
            .extractors
            .iter()
            .find(|e| e.supported_extension() == extension)
            .ok_or_else(|| InvalidExtensionError {
                extension: extension.clone(),
                path: path.to_path_buf(),
                supported: self.supported_extensions(),
            })?;

        let extraction = extractor.extract(path)?;
        info!(
            "Extracted {} points from {:?} ({} lines skipped)",
            extraction.points.len(),
            path,
            extraction.warnings.len()
        );
        Ok(extraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct CsvStub;

    impl Extractor for CsvStub {
        fn supported_extension(&self) -> &'static str {
            "csv"
        }

        fn extract(&self, _path: &Path) -> Result<Extraction, ExtractionError> {
            Ok(Extraction {
                points: vec![BatchPoint {
                    name: "stub".to_string(),
                    x: 1.0,
                    y: 2.0,
                    zone_label: "30T".to_string(),
                    datum: None,
                }],
                warnings: Vec::new(),
            })
        }
    }

    #[test]
    fn test_unknown_extension() {
        let registry = ExtractorRegistry::with_defaults();
        let err = registry.extract(Path::new("points.xlsx")).unwrap_err();

        match err {
            BatchError::InvalidExtension(e) => {
                assert_eq!(e.extension, "xlsx");
                assert_eq!(e.supported, vec!["txt".to_string()]);
                assert!(e.to_string().contains("txt"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("POINTS.TXT");
        fs::write(&path, "A 500000 4649776 30T\n").unwrap();

        let extraction = ExtractorRegistry::with_defaults().extract(&path).unwrap();
        assert_eq!(extraction.points.len(), 1);
    }

    #[test]
    fn test_register_custom_extractor() {
        let mut registry = ExtractorRegistry::with_defaults();
        registry.register(Box::new(CsvStub));
        assert_eq!(
            registry.supported_extensions(),
            vec!["txt".to_string(), "csv".to_string()]
        );

        let extraction = registry.extract(Path::new("anything.csv")).unwrap();
        assert_eq!(extraction.points[0].name, "stub");
    }

    #[test]
    fn test_missing_file() {
        let err = ExtractorRegistry::with_defaults()
            .extract(Path::new("/definitely/not/here.txt"))
            .unwrap_err();
        assert!(matches!(err, BatchError::Extraction(ExtractionError::Io { .. })));
    }
}
