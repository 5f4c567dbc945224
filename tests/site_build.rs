use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use matchday_tv::config::BuildConfig;
use matchday_tv::output::materialized_urls;
use matchday_tv::site::{BuildSummary, build_site};
use matchday_tv::sitemap::parse_locs;

const SITE: &str = "https://tv.example";

fn fixture_dir(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

// 2025-10-10 12:00:00 UTC
fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_760_097_600, 0).expect("valid instant")
}

fn config(out_dir: &Path) -> BuildConfig {
    let mut cfg = BuildConfig::from_lookup(|_| None).expect("defaults should load");
    cfg.site_url = SITE.to_string();
    cfg.shard_dir = fixture_dir("shards");
    cfg.aux_dir = fixture_dir("aux");
    cfg.template_dir = fixture_dir("templates");
    cfg.out_dir = out_dir.to_path_buf();
    cfg
}

fn build(out_dir: &Path) -> BuildSummary {
    build_site(&config(out_dir), now()).expect("build should succeed")
}

fn read_page(out_dir: &Path, rel: &str) -> String {
    fs::read_to_string(out_dir.join(rel)).expect("page should exist")
}

fn sitemap_locs(out_dir: &Path) -> BTreeSet<String> {
    parse_locs(&read_page(out_dir, "sitemap.xml"))
        .into_iter()
        .collect()
}

fn all_files(dir: &Path, out: &mut Vec<PathBuf>) {
    for entry in fs::read_dir(dir).expect("readable dir") {
        let path = entry.expect("dir entry").path();
        if path.is_dir() {
            all_files(&path, out);
        } else {
            out.push(path);
        }
    }
}

#[test]
fn summary_counts_recovered_failures() {
    let out = tempfile::tempdir().expect("tempdir");
    let summary = build(out.path());
    assert_eq!(summary.shards_read, 3);
    assert_eq!(summary.shards_skipped, 1);
    assert_eq!(summary.records_rejected, 1);
    assert_eq!(summary.duplicates_dropped, 2);
    assert_eq!(summary.matches, 4);
    assert_eq!(summary.channels, 4);
    assert_eq!(summary.pages_written, 11);
    assert_eq!(summary.sitemap_urls, 11);
}

#[test]
fn sitemap_matches_written_tree() {
    let out = tempfile::tempdir().expect("tempdir");
    build(out.path());
    let on_disk = materialized_urls(out.path(), SITE).expect("walk output");
    assert_eq!(sitemap_locs(out.path()), on_disk);
    assert!(on_disk.contains("https://tv.example/"));
    assert!(on_disk.contains("https://tv.example/day/20251009/"));
    assert!(on_disk.contains("https://tv.example/day/20251011/"));
    assert!(on_disk.contains("https://tv.example/match/arsenal-vs-chelsea/20251009/"));
    assert!(on_disk.contains("https://tv.example/match/celtic-vs-rangers/20251010/"));
    assert!(on_disk.contains("https://tv.example/channel/sky-sports/"));
}

#[test]
fn stale_pages_are_removed_before_writing() {
    let out = tempfile::tempdir().expect("tempdir");
    let stale = out.path().join("match/old-fixture/20200101/index.html");
    fs::create_dir_all(stale.parent().expect("parent")).expect("mkdir");
    fs::write(&stale, "old").expect("seed stale page");
    fs::write(out.path().join("robots.txt"), "User-agent: *").expect("seed robots");

    build(out.path());
    assert!(!stale.exists());
    assert!(out.path().join("robots.txt").exists());
    let on_disk = materialized_urls(out.path(), SITE).expect("walk output");
    assert_eq!(sitemap_locs(out.path()), on_disk);
}

#[test]
fn incremental_build_prunes_pages_missing_from_sitemap() {
    let out = tempfile::tempdir().expect("tempdir");
    let stale = out.path().join("match/old-vs-gone/20240101/index.html");
    fs::create_dir_all(stale.parent().expect("parent")).expect("mkdir");
    fs::write(&stale, "old").expect("seed stale page");
    let about = out.path().join("about/index.html");
    fs::create_dir_all(about.parent().expect("parent")).expect("mkdir");
    fs::write(&about, "hand written").expect("seed unrelated page");

    let mut cfg = config(out.path());
    cfg.clean_output = false;
    let summary = build_site(&cfg, now()).expect("build should succeed");
    assert_eq!(summary.pages_written, 11);
    assert!(!stale.exists());
    assert!(about.exists());
    let on_disk = materialized_urls(out.path(), SITE).expect("walk output");
    assert!(!on_disk.contains("https://tv.example/match/old-vs-gone/20240101/"));
    assert_eq!(sitemap_locs(out.path()), on_disk);
}

#[test]
fn repeated_builds_are_byte_identical() {
    let first = tempfile::tempdir().expect("tempdir");
    let second = tempfile::tempdir().expect("tempdir");
    build(first.path());
    build(second.path());
    build(second.path());

    let mut files = Vec::new();
    all_files(first.path(), &mut files);
    files.sort();
    assert_eq!(files.len(), 12);
    for path in files {
        let rel = path.strip_prefix(first.path()).expect("relative");
        let a = fs::read(&path).expect("read first");
        let b = fs::read(second.path().join(rel)).expect("read second");
        assert_eq!(a, b, "{} differs between runs", rel.display());
    }
}

#[test]
fn shared_channel_gets_one_page_listing_both_matches() {
    let out = tempfile::tempdir().expect("tempdir");
    build(out.path());
    let locs = parse_locs(&read_page(out.path(), "sitemap.xml"));
    let sky = locs
        .iter()
        .filter(|loc| loc.as_str() == "https://tv.example/channel/sky-sports/")
        .count();
    assert_eq!(sky, 1);

    let page = read_page(out.path(), "channel/sky-sports/index.html");
    assert!(page.contains("<h1>Sky Sports</h1>"));
    assert!(page.contains("Arsenal vs Chelsea"));
    assert!(page.contains("Celtic vs Rangers"));
    assert!(page.contains(r#"href="/match/celtic-vs-rangers/20251010/""#));
}

#[test]
fn retention_limits_channel_pages_but_not_details() {
    let out = tempfile::tempdir().expect("tempdir");
    build(out.path());
    // Kicked off 27 hours before the build, outside the 24h retention window.
    let sky = read_page(out.path(), "channel/sky-sports/index.html");
    assert!(!sky.contains("Real Madrid"));
    let movistar = read_page(out.path(), "channel/movistar/index.html");
    assert!(movistar.contains("No upcoming matches"));

    let detail = read_page(out.path(), "match/real-madrid-vs-barcelona/20251009/index.html");
    assert!(detail.contains("<h1>Real Madrid vs Barcelona</h1>"));
}

#[test]
fn detail_page_binds_record_and_aux_data() {
    let out = tempfile::tempdir().expect("tempdir");
    build(out.path());
    let page = read_page(out.path(), "match/arsenal-vs-chelsea/20251009/index.html");
    assert!(page.contains("<title>Arsenal vs Chelsea | TV Channels &amp; Kickoff Time</title>"));
    assert!(page.contains("Premier League | Emirates Stadium | 09 Oct 2025 23:30"));
    assert!(page.contains(r#"content="Arsenal vs Chelsea on Sky Sports, TNT Sports, Peacock""#));
    assert!(page.contains(r#"href="/channel/tnt-sports/""#));
    assert!(page.contains(r#"<span class="h2h-home">5</span>"#));
    assert!(page.contains(r#"<span class="odds-home">48%</span>"#));
    // Malformed lineups file and an unexpected form payload.
    assert!(page.contains("Lineups not available"));
    assert!(page.contains("Recent form not available"));
    assert!(page.contains("Match statistics not available"));
    assert!(!page.contains("{{"));
}

#[test]
fn record_defaults_fill_missing_fields() {
    let out = tempfile::tempdir().expect("tempdir");
    build(out.path());
    let page = read_page(out.path(), "match/inter-vs-milan/20251010/index.html");
    assert!(page.contains("Serie A | TBA |"));
    assert!(page.contains("TV listings to be announced"));
    assert!(page.contains("Head-to-head record not available"));
}

#[test]
fn listing_pages_share_a_date_menu() {
    let out = tempfile::tempdir().expect("tempdir");
    build(out.path());
    let today = read_page(out.path(), "index.html");
    assert!(today.contains(r#"<link rel="canonical" href="https://tv.example/">"#));
    assert!(today.contains(r#"href="/day/20251009/""#));
    assert!(today.contains(r#"href="/day/20251011/""#));
    assert!(today.contains("Yesterday"));
    assert!(today.contains("Tomorrow"));
    assert!(today.contains("Celtic vs Rangers"));
    assert!(today.contains("Inter vs Milan"));
    assert!(!today.contains("Real Madrid"));
    // Literal braces in the template survive untouched.
    assert!(today.contains(r#"{{ "theme": "dark" }}"#));

    let yesterday = read_page(out.path(), "day/20251009/index.html");
    assert!(yesterday.contains("Real Madrid vs Barcelona"));
    let tomorrow = read_page(out.path(), "day/20251011/index.html");
    assert!(tomorrow.contains("No televised matches"));
}

#[test]
fn missing_template_is_fatal_and_writes_nothing() {
    let out = tempfile::tempdir().expect("tempdir");
    let templates = tempfile::tempdir().expect("tempdir");
    fs::write(
        templates.path().join("home_template.html"),
        "<title>{{PAGE_TITLE}}</title>",
    )
    .expect("write home template");

    let mut cfg = config(out.path());
    cfg.template_dir = templates.path().to_path_buf();
    let err = build_site(&cfg, now()).expect_err("match template is missing");
    assert!(format!("{err:#}").contains("match_template.html"));
    assert!(fs::read_dir(out.path()).expect("out dir").next().is_none());
}

#[test]
fn unresolved_placeholder_fails_the_build() {
    let out = tempfile::tempdir().expect("tempdir");
    let templates = tempfile::tempdir().expect("tempdir");
    for name in ["match_template.html", "channel_template.html"] {
        fs::copy(
            fixture_dir("templates").join(name),
            templates.path().join(name),
        )
        .expect("copy template");
    }
    // CHANNEL_NAME is never bound on listing pages.
    fs::write(
        templates.path().join("home_template.html"),
        "{{PAGE_TITLE}} {{CHANNEL_NAME}}",
    )
    .expect("write home template");

    let mut cfg = config(out.path());
    cfg.template_dir = templates.path().to_path_buf();
    let err = build_site(&cfg, now()).expect_err("unbound placeholder");
    assert!(format!("{err:#}").contains("CHANNEL_NAME"));
    assert!(!out.path().join("index.html").exists());
}

#[test]
fn local_offset_moves_late_kickoff_to_next_day() {
    let out = tempfile::tempdir().expect("tempdir");
    let mut cfg = config(out.path());
    cfg.clock = matchday_tv::time_resolver::LocalClock::from_hours(5.0).expect("offset");
    build_site(&cfg, now()).expect("build");
    assert!(
        out.path()
            .join("match/arsenal-vs-chelsea/20251010/index.html")
            .exists()
    );
    assert!(!out.path().join("match/arsenal-vs-chelsea/20251009").exists());
    let today = read_page(out.path(), "index.html");
    assert!(today.contains("Arsenal vs Chelsea"));
}
