use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kmz_creator::{DistanceRecord, Session, SessionError, Warning};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use tracing::debug;

const PROMPT: &str = "[KMZ-CRT] >>> ";

const INTRO: &str = "Welcome to the KMZ Creator. Type help or ? to list commands.\n\
Note: Google Earth may drop the decimals of manually placed UTM points, so they can differ \
by less than 1m from points added here.";

/// 1行分のコマンド
#[derive(Parser, Debug)]
#[command(
    name = "kmz",
    no_binary_name = true,
    disable_version_flag = true,
    subcommand_required = true
)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// 終了する
    #[command(visible_aliases = ["quit", "q", "e", "x"])]
    Exit,

    /// 空のKMZをメモリ上に作る
    #[command(visible_aliases = ["new", "n", "c"])]
    Create,

    /// 既存のKMZファイルを開く
    #[command(visible_aliases = ["load", "l", "o"])]
    Open { path: PathBuf },

    /// 保存する（一度保存したらパスは省略可）
    #[command(visible_aliases = ["s"])]
    Save { path: Option<PathBuf> },

    /// 地点の一覧
    #[command(visible_aliases = ["sp", "points", "listpoints", "lp", "list"])]
    Showpoints,

    /// 経緯度で地点を追加
    #[command(visible_aliases = ["addlatlon", "al", "npl", "addclassic", "addll"])]
    Addlonlat {
        name: String,
        #[arg(allow_negative_numbers = true)]
        lon: f64,
        #[arg(allow_negative_numbers = true)]
        lat: f64,
    },

    /// UTM座標で地点を追加（例: `addutm T1 463712.5 4469224.7 30T`）
    #[command(visible_aliases = ["au", "autm", "np", "add"])]
    Addutm {
        name: String,
        #[arg(allow_negative_numbers = true)]
        x: f64,
        #[arg(allow_negative_numbers = true)]
        y: f64,
        zone: String,
        datum: Option<String>,
    },

    /// `name x y zone [datum]` の行が並んだファイル (.txt) から追加
    #[command(visible_aliases = ["addfile", "afl"])]
    Addlist { path: PathBuf },

    /// 既定の測地系を設定 (WGS84, NAD83, ETRS89)
    #[command(visible_aliases = ["stdt", "setdt"])]
    Setdatum { datum: String },

    /// 測地系をWGS84に戻す
    #[command(visible_aliases = ["rstd", "resetdt"])]
    Resetdatum,

    /// 現在の測地系を表示
    #[command(name = "datum", visible_aliases = ["dt"])]
    ShowDatum,

    /// 読み込み状況と未保存の変更を表示
    #[command(visible_aliases = ["stat", "st"])]
    Status,

    /// 名前で地点を削除
    #[command(visible_aliases = ["del", "dp", "remove"])]
    Delete { name: String },

    /// 地点を変更
    #[command(visible_aliases = ["mp", "mpoint", "modp"])]
    Modpoint {
        #[command(subcommand)]
        action: ModAction,
    },

    /// 全ての組み合わせの距離
    #[command(visible_aliases = ["distall", "distanceall"])]
    Distancesall { datum: Option<String> },

    /// 追加順で隣り合う点の距離と合計
    #[command(visible_aliases = ["dist", "distance", "distancesline", "distline"])]
    Distances { datum: Option<String> },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum ModAction {
    /// 名前を変更
    Rename { old_name: String, new_name: String },

    /// 経緯度で移動
    Relocate {
        name: String,
        #[arg(allow_negative_numbers = true)]
        lon: f64,
        #[arg(allow_negative_numbers = true)]
        lat: f64,
    },

    /// UTM座標で移動
    Relocateutm {
        name: String,
        #[arg(allow_negative_numbers = true)]
        x: f64,
        #[arg(allow_negative_numbers = true)]
        y: f64,
        zone: String,
        datum: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub fn run(session: &mut Session, editor: &mut DefaultEditor) -> Result<()> {
    println!("{INTRO}");

    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                if confirm_with(editor, session, "exit")? {
                    break;
                }
                continue;
            }
            Err(e) => return Err(anyhow::Error::new(e).context("Failed to read command")),
        };

        let mut tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(line.as_str());
        if tokens[0] == "?" {
            tokens[0] = "help";
        }

        let command = match ShellLine::try_parse_from(tokens) {
            Ok(parsed) => parsed.command,
            Err(e) => {
                // help の表示もここを通る
                let _ = e.print();
                continue;
            }
        };
        debug!("Parsed command: {:?}", command);

        let mut confirm = |action: &str| confirm_prompt(editor, action);
        match execute(session, command, &mut confirm) {
            Ok(Flow::Exit) => break,
            Ok(Flow::Continue) => {}
            Err(e) => println!("Error: {e:#}"),
        }
    }

    println!("Exiting KMZ Creator...");
    Ok(())
}

fn confirm_with(editor: &mut DefaultEditor, session: &Session, action: &str) -> Result<bool> {
    if !session.is_dirty() {
        return Ok(true);
    }
    confirm_prompt(editor, action)
}

fn confirm_prompt(editor: &mut DefaultEditor, action: &str) -> Result<bool> {
    let prompt = format!(
        "You have unsaved changes. Are you sure you want to {action}?\nALL UNSAVED CHANGES WILL BE LOST (y/n): "
    );
    match editor.readline(&prompt) {
        Ok(answer) => Ok(answer.trim().eq_ignore_ascii_case("y")),
        Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(false),
        Err(e) => Err(e).context("Failed to read confirmation"),
    }
}

/// コマンドをひとつ実行する。未保存の変更を捨てる前に `confirm` で確認する
pub fn execute(
    session: &mut Session,
    command: Command,
    confirm: &mut dyn FnMut(&str) -> Result<bool>,
) -> Result<Flow> {
    match command {
        Command::Exit => {
            if session.is_dirty() && !confirm("exit")? {
                println!("Exit cancelled.");
                return Ok(Flow::Continue);
            }
            return Ok(Flow::Exit);
        }
        Command::Create => {
            if session.is_dirty() && !confirm("create a new KMZ")? {
                println!("Operation cancelled.");
                return Ok(Flow::Continue);
            }
            session.new_document();
            println!("New KMZ created in memory. (Not yet saved, use save <path>)");
        }
        Command::Open { path } => {
            if session.is_dirty() && !confirm("open a new KMZ")? {
                println!("Operation cancelled.");
                return Ok(Flow::Continue);
            }
            let warnings = session
                .open(&path)
                .with_context(|| format!("Error loading KMZ file {}", path.display()))?;
            print_warnings(&warnings);
            println!("KMZ file {} loaded successfully.", path.display());
        }
        Command::Save { path } => {
            let written = session.save(path.as_deref()).context("Error saving KMZ file")?;
            println!("KMZ saved successfully to {}.", written.display());
        }
        Command::Showpoints => {
            let points = session.points()?;
            if points.is_empty() {
                println!("No points found in the KMZ.");
            } else {
                println!("Points in the KMZ:");
                for point in points {
                    println!(
                        " - {}: (lon: {}, lat: {})",
                        point.name, point.longitude, point.latitude
                    );
                }
            }
        }
        Command::Addlonlat { name, lon, lat } => {
            if session.add_lon_lat(&name, lon, lat)? {
                println!("Point {name} added at (lon: {lon}, lat: {lat}).");
            } else {
                println!("Error: Point {name} could not be added, the name already exists.");
            }
        }
        Command::Addutm {
            name,
            x,
            y,
            zone,
            datum,
        } => match session.add_utm(&name, x, y, &zone, datum.as_deref())? {
            Some((lon, lat)) => {
                println!("Point {name} added at (lon: {lon}, lat: {lat}) from UTM coordinates.")
            }
            None => println!("Error: Point {name} could not be added, the name already exists."),
        },
        Command::Addlist { path } => {
            let report = session.add_batch(&path)?;
            print_warnings(&report.warnings);
            for point in &report.added {
                println!(
                    "Point {} added at (lon: {}, lat: {}) from UTM coordinates.",
                    point.name, point.longitude, point.latitude
                );
            }
            for name in &report.duplicates {
                println!("Error: Point {name} could not be added, the name already exists.");
            }
            for (name, error) in &report.failed {
                println!("Error adding point {name}: {error}");
            }
            if report.added.is_empty() {
                println!("{}", no_points_message(session));
            }
        }
        Command::Setdatum { datum } => {
            let datum = session.set_datum(&datum)?;
            println!("Default datum set to {datum}.");
        }
        Command::Resetdatum => {
            session.reset_datum();
            println!("Datum reset to default ({}).", session.datum());
        }
        Command::ShowDatum => print_datum(session),
        Command::Status => {
            println!("=== KMZ CREATOR STATUS ===");
            match session.document() {
                None => println!("No KMZ loaded or created. Use create or open <path> to begin"),
                Some(doc) => match doc.file_path() {
                    Some(path) => println!("KMZ loaded: {}", path.display()),
                    None => println!("KMZ created (not saved yet)."),
                },
            }
            if session.is_dirty() {
                println!("There are unsaved changes. Use save <path> to preserve them");
            } else {
                println!("No unsaved changes.");
            }
            print_datum(session);
            println!("==========================");
        }
        Command::Delete { name } => {
            if session.delete(&name)? {
                println!("Point {name} deleted successfully.");
            } else {
                println!("Error: Point '{name}' not found.");
            }
        }
        Command::Modpoint { action } => modify_point(session, action)?,
        Command::Distancesall { datum } => {
            let (datum, distances) = session.distances_all(datum.as_deref())?;
            println!("Distances between all points (using datum {datum}):");
            print_distances(&distances);
        }
        Command::Distances { datum } => {
            let (datum, distances) = session.distances_line(datum.as_deref())?;
            println!("Warning: distances follow the order the points were added. Use distancesall for every pair.");
            println!("Distances between points in a line configuration (using datum {datum}):");
            print_distances(&distances);

            let total: f64 = distances.iter().map(|d| d.meters).sum();
            println!("Total distance: {total:.2} meters");
        }
    }

    Ok(Flow::Continue)
}

fn modify_point(session: &mut Session, action: ModAction) -> Result<(), SessionError> {
    match action {
        ModAction::Rename { old_name, new_name } => {
            if session.rename(&old_name, &new_name)? {
                println!("Point renamed from {old_name} to {new_name}.");
            } else {
                println!("Error: Point '{old_name}' not found.");
            }
        }
        ModAction::Relocate { name, lon, lat } => {
            if session.relocate(&name, lon, lat)? {
                println!("Point {name} relocated to (lon: {lon}, lat: {lat}).");
            } else {
                println!("Error: Point '{name}' not found.");
            }
        }
        ModAction::Relocateutm {
            name,
            x,
            y,
            zone,
            datum,
        } => match session.relocate_utm(&name, x, y, &zone, datum.as_deref())? {
            Some((lon, lat)) => println!(
                "Point {name} relocated to (lon: {lon}, lat: {lat}) from UTM coordinates."
            ),
            None => println!("Error: Point '{name}' not found."),
        },
    }
    Ok(())
}

fn no_points_message(session: &Session) -> String {
    format!(
        "No valid points found in the file. Supported file types: {} (lines: name x y zone [datum])",
        session.supported_extensions().join(", ")
    )
}

fn print_datum(session: &Session) {
    let datum = session.datum();
    if datum == Default::default() {
        println!("Current datum: {datum} (default)");
    } else {
        println!("Current datum: {datum} (changed from default WGS84)");
    }
}

fn print_distances(distances: &[DistanceRecord]) {
    for d in distances {
        println!(" - {} to {}: {:.2} meters", d.from, d.to, d.meters);
    }
}

pub fn print_warnings(warnings: &[Warning]) {
    for warning in warnings {
        println!("Warning: {warning}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn parse(line: &str) -> Command {
        ShellLine::try_parse_from(line.split_whitespace())
            .unwrap()
            .command
    }

    fn run_line(session: &mut Session, line: &str, answer: bool) -> Flow {
        let mut confirm = |_: &str| -> Result<bool> { Ok(answer) };
        execute(session, parse(line), &mut confirm).unwrap()
    }

    #[test]
    fn test_aliases() {
        assert_eq!(parse("q"), Command::Exit);
        assert_eq!(parse("n"), Command::Create);
        assert_eq!(parse("sp"), Command::Showpoints);
        assert_eq!(parse("dt"), Command::ShowDatum);
        assert_eq!(
            parse("add T1 463712.5 4469224.7 30T"),
            Command::Addutm {
                name: "T1".to_string(),
                x: 463712.5,
                y: 4469224.7,
                zone: "30T".to_string(),
                datum: None,
            }
        );
        assert_eq!(
            parse("dist NAD83"),
            Command::Distances {
                datum: Some("NAD83".to_string())
            }
        );
    }

    #[test]
    fn test_negative_numbers() {
        assert_eq!(
            parse("addll T1 -3.7038 40.4168"),
            Command::Addlonlat {
                name: "T1".to_string(),
                lon: -3.7038,
                lat: 40.4168,
            }
        );
        assert_eq!(
            parse("mp relocate P -1.5 -20"),
            Command::Modpoint {
                action: ModAction::Relocate {
                    name: "P".to_string(),
                    lon: -1.5,
                    lat: -20.0,
                }
            }
        );
    }

    #[test]
    fn test_invalid_lines() {
        assert!(ShellLine::try_parse_from(["frobnicate"]).is_err());
        assert!(ShellLine::try_parse_from(["addll", "T1", "east", "40"]).is_err());
        assert!(ShellLine::try_parse_from(["modpoint"]).is_err());
    }

    #[test]
    fn test_exit_confirmation() {
        let mut session = Session::new();
        assert_eq!(run_line(&mut session, "exit", false), Flow::Exit);

        run_line(&mut session, "create", true);
        assert_eq!(run_line(&mut session, "exit", false), Flow::Continue);
        assert_eq!(run_line(&mut session, "exit", true), Flow::Exit);
    }

    #[test]
    fn test_create_cancelled_keeps_points() {
        let mut session = Session::new();
        run_line(&mut session, "create", true);
        run_line(&mut session, "addll A 1 2", true);

        run_line(&mut session, "create", false);
        assert_eq!(session.points().unwrap().len(), 1);

        run_line(&mut session, "create", true);
        assert!(session.points().unwrap().is_empty());
    }

    #[test]
    fn test_session_workflow() {
        let temp_dir = TempDir::new().unwrap();
        let kmz = temp_dir.path().join("walk");
        let list = temp_dir.path().join("list.txt");
        fs::write(&list, "B 500000 4649776 30T\nC 500100 4649776 30T\n").unwrap();

        let mut session = Session::new();
        run_line(&mut session, "create", true);
        run_line(&mut session, "addutm A 500000 4649676 30T", true);
        run_line(&mut session, &format!("addlist {}", list.display()), true);
        run_line(&mut session, "mp rename A Start", true);
        run_line(&mut session, &format!("save {}", kmz.display()), true);
        assert!(!session.is_dirty());

        let names: Vec<String> = session.points().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Start", "B", "C"]);

        let (_, line) = session.distances_line(None).unwrap();
        assert!((line[0].meters - 100.0).abs() < 1.0);

        let mut confirm = |_: &str| -> Result<bool> { Ok(true) };
        assert!(execute(&mut session, parse("open walk-missing"), &mut confirm).is_err());
        assert_eq!(session.points().unwrap().len(), 3);

        run_line(&mut session, "delete B", true);
        assert!(session.is_dirty());
        run_line(&mut session, &format!("open {}", kmz.display()), true);
        assert_eq!(session.points().unwrap().len(), 3);
    }

    #[test]
    fn test_empty_list_mentions_supported_types() {
        let temp_dir = TempDir::new().unwrap();
        let list = temp_dir.path().join("empty.txt");
        fs::write(&list, "\n\n").unwrap();

        let mut session = Session::new();
        run_line(&mut session, "create", true);
        run_line(&mut session, &format!("addlist {}", list.display()), true);
        assert!(session.points().unwrap().is_empty());

        let message = no_points_message(&session);
        assert!(message.contains("Supported file types: txt"), "{}", message);
    }

    #[test]
    fn test_command_errors_are_reported() {
        let mut session = Session::new();
        let mut confirm = |_: &str| -> Result<bool> { Ok(true) };

        let err = execute(&mut session, parse("sp"), &mut confirm).unwrap_err();
        assert!(err.to_string().contains("no KMZ loaded"));

        execute(&mut session, parse("create"), &mut confirm).unwrap();
        let err = execute(&mut session, parse("setdatum GDA94"), &mut confirm).unwrap_err();
        assert!(err.to_string().contains("GDA94"));
    }
}
