use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const BOOK: &str = "---\ntitle: \"The Reading Lamp\"\nauthor: A. Reader\ndescription: A short book about reading actively\n---\n\n# Reading Is Active\n\nA good reader asks questions while reading. Every book has a structure that can be outlined.\n\n## Questions\n\nWhat is the book about as a whole? What is being said in detail?\n\n# Coming to Terms\n\nAn author uses words in special senses. The reader must find the key terms and come to terms with the author.\n";

fn temp_path(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "deepread-cli-{label}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ))
}

fn deepread(data_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_deepread"))
        .env_remove("DEEPREAD_DATA_DIR")
        .env_remove("DEEPREAD_DIFFICULTY")
        .arg("--data-dir")
        .arg(data_dir)
        .args(["--difficulty", "master", "--seed", "7"])
        .args(args)
        .output()
        .expect("run cli")
}

fn json_lines(output: &Output) -> Vec<Value> {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect()
}

/// Import the sample book into a fresh data dir and return `(dir, book_id)`.
fn imported(label: &str) -> (PathBuf, String) {
    let dir = temp_path(label);
    std::fs::create_dir_all(&dir).expect("create data dir");
    let book_path = dir.join("reading-lamp.md");
    std::fs::write(&book_path, BOOK).expect("write book");
    let output = deepread(&dir, &["--json", "import", book_path.to_str().expect("utf8")]);
    let lines = json_lines(&output);
    let id = lines[0]["book"]["id"].as_str().expect("book id").to_string();
    assert_eq!(lines[0]["chapters"], 2);
    (dir, id)
}

#[test]
fn import_then_list_books() {
    let (dir, id) = imported("books");
    let lines = json_lines(&deepread(&dir, &["--json", "books"]));
    let books = lines[0].as_array().expect("book list");
    assert_eq!(books.len(), 1);
    assert_eq!(books[0]["id"], id.as_str());
    assert_eq!(books[0]["title"], "The Reading Lamp");

    let output = deepread(&dir, &["books"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("The Reading Lamp"));
}

#[test]
fn fresh_book_starts_in_scouting() {
    let (dir, id) = imported("status");
    let lines = json_lines(&deepread(&dir, &["--json", "status", &id]));
    let view = &lines[0];
    assert_eq!(view["state"]["current_phase"], "SCOUTING");
    assert_eq!(view["state"]["level"], 1);
    assert_eq!(view["progress"]["ready"], false);
    assert_eq!(view["level"]["xp_for_next"], 200);
    assert_eq!(view["level"]["progress"], 0);
    assert_eq!(view["tools"][1], "classify_book");
    assert_eq!(view["needs_rest"], false);
}

#[test]
fn quest_is_saved_as_active() {
    let (dir, id) = imported("quest");
    let lines = json_lines(&deepread(&dir, &["--json", "quest", &id]));
    let quest = &lines[0];
    assert_eq!(quest["status"], "active");
    let quest_id = quest["id"].as_str().expect("quest id").to_string();

    let status = json_lines(&deepread(&dir, &["--json", "status", &id]));
    assert_eq!(status[0]["state"]["active_quest_id"], quest_id.as_str());
}

#[test]
fn rejected_unity_statement_costs_mana() {
    let (dir, id) = imported("reject");
    let before = json_lines(&deepread(&dir, &["--json", "status", &id]))[0]["state"]["mana"]
        .as_i64()
        .expect("mana");

    let lines = json_lines(&deepread(&dir, &["--json", "submit", &id, "unity", "Too short"]));
    assert_eq!(lines[0]["valid"], false);

    let after = json_lines(&deepread(&dir, &["--json", "status", &id]))[0]["state"]["mana"]
        .as_i64()
        .expect("mana");
    assert!(after < before, "mana {before} -> {after}");
}

#[test]
fn debug_goto_moves_the_phase() {
    let (dir, id) = imported("debug");
    let lines = json_lines(&deepread(&dir, &["--json", "debug", &id, "/goto:judgment"]));
    assert_eq!(lines[0]["current_phase"], "JUDGMENT");

    let status = json_lines(&deepread(&dir, &["--json", "status", &id]));
    assert_eq!(status[0]["state"]["current_phase"], "JUDGMENT");
}

#[test]
fn unknown_debug_command_fails() {
    let (dir, id) = imported("debug-bad");
    let output = deepread(&dir, &["debug", &id, "/goto:nowhere"]);
    assert!(!output.status.success());
}

#[test]
fn search_finds_the_matching_chapter() {
    let (dir, id) = imported("search");
    let lines = json_lines(&deepread(
        &dir,
        &["--json", "search", &id, "key terms come to terms with the author", "-k", "1"],
    ));
    let hits = lines[0].as_array().expect("hits");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["chapter_index"], 2);
}

#[test]
fn summary_and_delete() {
    let (dir, id) = imported("summary");
    let output = deepread(&dir, &["summary", &id]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("The Reading Lamp"));

    assert!(deepread(&dir, &["delete", &id]).status.success());
    let lines = json_lines(&deepread(&dir, &["--json", "books"]));
    assert!(lines[0].as_array().expect("book list").is_empty());
    assert!(!deepread(&dir, &["status", &id]).status.success());
}

#[test]
fn difficulties_lists_every_tier() {
    let dir = temp_path("difficulties");
    let lines = json_lines(&deepread(&dir, &["--json", "difficulties"]));
    assert_eq!(lines[0].as_array().expect("tiers").len(), 4);
}
