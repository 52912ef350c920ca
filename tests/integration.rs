use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const REGULATION: &str = "PERATURAN REKTOR UNIVERSITAS\nTENTANG PENYELENGGARAAN PENDIDIKAN\n\n\
Pasal 1\nDalam peraturan ini yang dimaksud dengan mahasiswa adalah peserta didik pada jenjang sarjana.\n\n\
Pasal 2\nMahasiswa wajib melakukan registrasi administrasi setiap awal semester.\n\n\
Pasal 3\nCuti akademik dapat diberikan paling lama dua semester selama masa studi.\n\x0c\
Pasal 4\nMahasiswa yang tidak melakukan registrasi dinyatakan tidak aktif.";

const CALENDAR: &str = "KALENDER AKADEMIK TAHUN 2023/2024\n\
Tanggal\tKegiatan\n\
5 Februari 2024\tAwal perkuliahan semester genap\n\
10 - 15 Februari 2024\tPengisian KRS\n\
1 Maret 2024\tBatas pembayaran UKT\n\
18 - 22 Maret 2024\tUjian Tengah Semester";

fn arag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("arag");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let docs_dir = root.join("documents");
    fs::create_dir_all(&docs_dir).unwrap();
    fs::write(docs_dir.join("peraturan-akademik.txt"), REGULATION).unwrap();
    fs::write(docs_dir.join("kalender-akademik.txt"), CALENDAR).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/arag.sqlite"

[documents]
dir = "{root}/documents"
include_globs = ["**/*.txt", "**/*.md", "**/*.pdf"]

[embedding]
provider = "hash"
dims = 64

[ingest]
workers = 2
"#,
        root = root.display()
    );

    let config_path = config_dir.join("arag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_arag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = arag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run arag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn line_value(stdout: &str, key: &str) -> String {
    stdout
        .lines()
        .find_map(|l| l.trim().strip_prefix(key).map(|v| v.trim().to_string()))
        .unwrap_or_else(|| panic!("no '{}' line in:\n{}", key, stdout))
}

fn init_and_ingest(config_path: &Path) -> String {
    let (_, stderr, success) = run_arag(config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    let (stdout, stderr, success) = run_arag(config_path, &["ingest"]);
    assert!(success, "ingest failed: {}", stderr);
    stdout
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_arag(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/arag.sqlite").exists());

    let (_, stderr, success) = run_arag(&config_path, &["init"]);
    assert!(success, "second init failed: {}", stderr);
}

#[test]
fn test_ingest_classifies_documents() {
    let (_tmp, config_path) = setup_test_env();
    let stdout = init_and_ingest(&config_path);

    assert_eq!(line_value(&stdout, "documents ingested:"), "2");
    assert_eq!(line_value(&stdout, "regulation:"), "1");
    assert_eq!(line_value(&stdout, "calendar:"), "1");
    assert_eq!(line_value(&stdout, "failures:"), "0");
    assert!(stdout.trim_end().ends_with("ok"));
}

#[test]
fn test_reingest_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();
    let first = init_and_ingest(&config_path);
    let total = line_value(&first, "chunks in index:");

    let (second, stderr, success) = run_arag(&config_path, &["ingest"]);
    assert!(success, "reingest failed: {}", stderr);
    assert_eq!(line_value(&second, "documents ingested:"), "0");
    assert_eq!(line_value(&second, "documents unchanged:"), "2");
    assert_eq!(line_value(&second, "chunks in index:"), total);

    let (full, stderr, success) = run_arag(&config_path, &["ingest", "--full"]);
    assert!(success, "full ingest failed: {}", stderr);
    assert_eq!(line_value(&full, "documents ingested:"), "2");
    assert_eq!(line_value(&full, "chunks in index:"), total);
}

#[test]
fn test_reingest_after_embedding_change() {
    let (_tmp, config_path) = setup_test_env();
    init_and_ingest(&config_path);

    let config = fs::read_to_string(&config_path).unwrap();
    fs::write(&config_path, config.replace("dims = 64", "dims = 32")).unwrap();

    let (stdout, stderr, success) = run_arag(&config_path, &["ingest"]);
    assert!(success, "reingest failed: {}", stderr);
    assert_eq!(line_value(&stdout, "documents ingested:"), "2");
    assert_eq!(line_value(&stdout, "documents unchanged:"), "0");

    let (stdout, _, success) = run_arag(&config_path, &["retrieve", "berapa lama cuti akademik"]);
    assert!(success);
    assert!(!stdout.contains("No results."));
}

#[test]
fn test_ingest_dry_run_writes_nothing() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_arag(&config_path, &["ingest", "--dry-run"]);
    assert!(success, "dry run failed: {}", stderr);
    assert!(stdout.contains("(dry-run)"));
    assert_eq!(line_value(&stdout, "documents ingested:"), "2");
    assert!(!tmp.path().join("data/arag.sqlite").exists());
}

#[test]
fn test_ingest_reports_failures_and_continues() {
    let (tmp, config_path) = setup_test_env();
    fs::write(tmp.path().join("documents/rusak.pdf"), b"not a pdf").unwrap();

    let stdout = init_and_ingest(&config_path);
    assert_eq!(line_value(&stdout, "documents ingested:"), "2");
    assert_eq!(line_value(&stdout, "failures:"), "1");
    assert!(stdout.contains("rusak.pdf:"));
}

#[test]
fn test_ingest_refuses_while_locked() {
    let (tmp, config_path) = setup_test_env();
    run_arag(&config_path, &["init"]);
    fs::write(tmp.path().join("data/arag.sqlite.lock"), "").unwrap();

    let (_, stderr, success) = run_arag(&config_path, &["ingest"]);
    assert!(!success);
    assert!(stderr.contains("Another ingestion is running"));
}

#[test]
fn test_ingest_dir_override() {
    let (tmp, config_path) = setup_test_env();
    let other = tmp.path().join("other");
    fs::create_dir_all(&other).unwrap();
    fs::write(other.join("catatan.md"), "Catatan rapat fakultas tentang kurikulum.").unwrap();

    run_arag(&config_path, &["init"]);
    let (stdout, stderr, success) =
        run_arag(&config_path, &["ingest", "--dir", other.to_str().unwrap()]);
    assert!(success, "ingest failed: {}", stderr);
    assert_eq!(line_value(&stdout, "documents ingested:"), "1");
    assert_eq!(line_value(&stdout, "generic:"), "1");
}

#[test]
fn test_retrieve_article() {
    let (_tmp, config_path) = setup_test_env();
    init_and_ingest(&config_path);

    let (stdout, stderr, success) = run_arag(&config_path, &["retrieve", "Apa isi Pasal 2?"]);
    assert!(success, "retrieve failed: {}", stderr);
    assert!(stdout.contains("\"type\":\"ARTICLE\""));
    let first = stdout.lines().find(|l| l.starts_with("1. ")).unwrap();
    assert!(first.contains("peraturan-akademik.txt (Page 1)"));
    assert!(stdout.contains("article: 2"));
    assert!(stdout.contains("registrasi administrasi"));
}

#[test]
fn test_retrieve_article_on_second_page() {
    let (_tmp, config_path) = setup_test_env();
    init_and_ingest(&config_path);

    let (stdout, _, success) = run_arag(&config_path, &["retrieve", "Pasal 4"]);
    assert!(success);
    let first = stdout.lines().find(|l| l.starts_with("1. ")).unwrap();
    assert!(first.contains("peraturan-akademik.txt (Page 2)"));
}

#[test]
fn test_retrieve_missing_article_falls_back() {
    let (_tmp, config_path) = setup_test_env();
    init_and_ingest(&config_path);

    let (stdout, _, success) = run_arag(&config_path, &["retrieve", "Apa isi Pasal 99?"]);
    assert!(success);
    assert!(stdout.contains("1. "));
    assert!(!stdout.contains("No results."));
}

#[test]
fn test_retrieve_calendar() {
    let (_tmp, config_path) = setup_test_env();
    init_and_ingest(&config_path);

    let (stdout, stderr, success) = run_arag(
        &config_path,
        &["retrieve", "Kapan pengisian KRS bulan Februari?"],
    );
    assert!(success, "retrieve failed: {}", stderr);
    assert!(stdout.contains("\"type\":\"CALENDAR\""));
    assert!(stdout.contains("month: Februari"));
    assert!(stdout.contains("Pengisian KRS"));
    assert!(!stdout.contains("Ujian Tengah Semester"));
}

#[test]
fn test_retrieve_deterministic() {
    let (_tmp, config_path) = setup_test_env();
    init_and_ingest(&config_path);

    let (first, _, _) = run_arag(&config_path, &["retrieve", "berapa lama cuti akademik"]);
    let (second, _, _) = run_arag(&config_path, &["retrieve", "berapa lama cuti akademik"]);
    assert_eq!(first, second);
}

#[test]
fn test_classify() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_arag(
        &config_path,
        &[
            "classify",
            tmp.path().join("documents/kalender-akademik.txt").to_str().unwrap(),
        ],
    );
    assert!(success, "classify failed: {}", stderr);
    assert_eq!(line_value(&stdout, "type:"), "calendar");
    assert_eq!(line_value(&stdout, "calendar_table:"), "2");

    let (stdout, _, success) = run_arag(
        &config_path,
        &[
            "classify",
            tmp.path().join("documents/peraturan-akademik.txt").to_str().unwrap(),
        ],
    );
    assert!(success);
    assert_eq!(line_value(&stdout, "type:"), "regulation");
    assert_eq!(line_value(&stdout, "article:"), "4");
    assert_eq!(line_value(&stdout, "pages:"), "2");
}

#[test]
fn test_parse() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_arag(&config_path, &["parse", "Bandingkan Pasal 13 dan 14"]);
    assert!(success, "parse failed: {}", stderr);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["type"], "ARTICLE");
    assert_eq!(json["filters"]["article_numbers"], serde_json::json!([13, 14]));

    let (stdout, _, _) = run_arag(&config_path, &["parse", "Kapan libur semester?"]);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["type"], "GENERAL");
    assert_eq!(json["filters"]["doc_type_hint"], "calendar");
}

#[test]
fn test_invalid_config_fails() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("config/bad.toml");
    fs::write(&bad, "[db]\npath = \"x\"\n[chunking]\nmax_chunk_size = 10\noverlap = 20\n").unwrap();

    let (_, stderr, success) = run_arag(&bad, &["init"]);
    assert!(!success);
    assert!(stderr.contains("overlap"));
}
