use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::warn;

use super::{BatchPoint, Extraction, Extractor};
use crate::error::{ExtractionError, Warning};

/// 空白区切りの行 `name x y zone [datum]`
///
/// ```text
/// PointA 500000 4649776 30T
/// PointB 400000,5 4500000 33N ETRS89
/// ```
pub struct TxtExtractor;

impl Extractor for TxtExtractor {
    fn supported_extension(&self) -> &'static str {
        "txt"
    }

    fn extract(&self, path: &Path) -> Result<Extraction, ExtractionError> {
        let io_error = |source| ExtractionError::Io {
            path: path.to_path_buf(),
            source,
        };
        let reader = BufReader::new(File::open(path).map_err(io_error)?);

        let mut extraction = Extraction::default();
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(io_error)?;
            let line_number = index + 1;

            if line.trim().is_empty() {
                continue;
            }

            match parse_line(&line) {
                Ok(point) => extraction.points.push(point),
                Err(reason) => {
                    warn!("Skipping line {}: {} ({})", line_number, line.trim(), reason);
                    extraction.warnings.push(Warning::MalformedLine {
                        line_number,
                        line: line.trim().to_string(),
                        reason,
                    });
                }
            }
        }

        Ok(extraction)
    }
}

fn parse_line(line: &str) -> Result<BatchPoint, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 4 && parts.len() != 5 {
        return Err(format!("expected 4 or 5 columns, found {}", parts.len()));
    }

    Ok(BatchPoint {
        name: parts[0].to_string(),
        x: parse_number(parts[1])?,
        y: parse_number(parts[2])?,
        zone_label: parts[3].to_string(),
        datum: parts.get(4).map(|d| d.to_string()),
    })
}

/// 小数点のカンマはピリオドに置き換える
fn parse_number(text: &str) -> Result<f64, String> {
    text.replace(',', ".")
        .parse::<f64>()
        .map_err(|e| format!("could not convert '{}' to a number: {}", text, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn extract(content: &str) -> Extraction {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("points.txt");
        fs::write(&path, content).unwrap();
        TxtExtractor.extract(&path).unwrap()
    }

    #[test]
    fn test_extract_lines() {
        let extraction = extract(
            "PointA 500000 4649776 30T\n\
             PointB 400000,5 4500000,25 33N ETRS89\n",
        );

        assert!(extraction.warnings.is_empty());
        assert_eq!(
            extraction.points,
            vec![
                BatchPoint {
                    name: "PointA".to_string(),
                    x: 500000.0,
                    y: 4649776.0,
                    zone_label: "30T".to_string(),
                    datum: None,
                },
                BatchPoint {
                    name: "PointB".to_string(),
                    x: 400000.5,
                    y: 4500000.25,
                    zone_label: "33N".to_string(),
                    datum: Some("ETRS89".to_string()),
                },
            ]
        );
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let extraction = extract(
            "good 1 2 30T\n\
             \n\
             too few 1\n\
             bad x1 2 30T\n\
             a b c d e f\n\
             last\t3\t4\t31S\n",
        );

        let names: Vec<&str> = extraction.points.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["good", "last"]);

        let lines: Vec<usize> = extraction
            .warnings
            .iter()
            .map(|w| match w {
                Warning::MalformedLine { line_number, .. } => *line_number,
                other => panic!("unexpected warning {:?}", other),
            })
            .collect();
        assert_eq!(lines, vec![3, 4, 5]);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("12,5").unwrap(), 12.5);
        assert_eq!(parse_number("-7.25").unwrap(), -7.25);
        assert!(parse_number("1,2,3").is_err());
    }
}
