use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tubefetch_engine::db::{self, AppSettings};
use tubefetch_engine::engine::{normalize_batch_input, Engine};
use tubefetch_engine::logbuf::LogBuffer;
use tubefetch_engine::paths::AppPaths;
use tubefetch_engine::request::{DownloadMode, DownloadRequest};
use tubefetch_engine::tools::BinaryManager;
use tubefetch_engine::updater::{AppUpdater, APP_VERSION};

const LOG_CAPACITY: usize = 200;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> Result<(), String> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "download" => cmd_download(&args[2..]),
        "batch" => cmd_batch(&args[2..]),
        "probe" => cmd_probe(&args[2..]),
        "history" => cmd_history(&args[2..]),
        "tool-status" => cmd_tool_status(),
        "update-tool" => cmd_update_tool(),
        "self-update" => cmd_self_update(&args[2..]),
        other => Err(format!("unknown command: {other} (try --help)")),
    }
}

#[derive(Default)]
struct RequestOptions {
    out: Option<PathBuf>,
    audio: bool,
    quality: Option<String>,
    playlist: bool,
    items: Option<String>,
    subs: bool,
    auto_subs: bool,
    sub_lang: Option<String>,
    sponsorblock: bool,
    safe_mode: bool,
    trim_start: Option<String>,
    trim_end: Option<String>,
    client: Option<String>,
    cookies: Option<PathBuf>,
}

fn parse_request_flags(rest: &[String]) -> Result<(Vec<String>, RequestOptions), String> {
    let mut positionals = Vec::new();
    let mut opts = RequestOptions::default();

    let mut i = 0;
    while i < rest.len() {
        match rest[i].as_str() {
            "--out" => {
                i += 1;
                opts.out = Some(PathBuf::from(flag_value(rest, i, "--out")?));
            }
            "--audio" => opts.audio = true,
            "--quality" => {
                i += 1;
                opts.quality = Some(flag_value(rest, i, "--quality")?.to_string());
            }
            "--playlist" => opts.playlist = true,
            "--items" => {
                i += 1;
                opts.items = Some(flag_value(rest, i, "--items")?.to_string());
            }
            "--subs" => opts.subs = true,
            "--auto-subs" => opts.auto_subs = true,
            "--sub-lang" => {
                i += 1;
                opts.sub_lang = Some(flag_value(rest, i, "--sub-lang")?.to_string());
            }
            "--sponsorblock" => opts.sponsorblock = true,
            "--safe-mode" => opts.safe_mode = true,
            "--trim-start" => {
                i += 1;
                opts.trim_start = Some(flag_value(rest, i, "--trim-start")?.to_string());
            }
            "--trim-end" => {
                i += 1;
                opts.trim_end = Some(flag_value(rest, i, "--trim-end")?.to_string());
            }
            "--client" => {
                i += 1;
                opts.client = Some(flag_value(rest, i, "--client")?.to_string());
            }
            "--cookies" => {
                i += 1;
                opts.cookies = Some(PathBuf::from(flag_value(rest, i, "--cookies")?));
            }
            other if other.starts_with('-') => {
                return Err(format!("unknown arg: {other} (try --help)"));
            }
            other => positionals.push(other.to_string()),
        }
        i += 1;
    }

    Ok((positionals, opts))
}

fn flag_value<'a>(rest: &'a [String], i: usize, flag: &str) -> Result<&'a str, String> {
    rest.get(i)
        .map(|s| s.as_str())
        .ok_or_else(|| format!("{flag} requires a value"))
}

fn require_http_url(raw: &str) -> Result<(), String> {
    match url::Url::parse(raw) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(format!("not an http(s) URL: {raw}")),
    }
}

fn app_paths() -> Result<AppPaths, String> {
    let base = AppPaths::default_base_dir()
        .ok_or_else(|| "could not determine base dir; set TUBEFETCH_BASE_DIR".to_string())?;
    Ok(AppPaths::new(base))
}

fn build_request(
    url: String,
    opts: &RequestOptions,
    settings: &AppSettings,
) -> Result<DownloadRequest, String> {
    let output_dir = match &opts.out {
        Some(dir) => dir.clone(),
        None if !settings.last_save_path.is_empty() => PathBuf::from(&settings.last_save_path),
        None => AppPaths::default_download_dir()
            .ok_or_else(|| "could not determine a download dir; pass --out".to_string())?,
    };

    let mut request = DownloadRequest {
        url,
        output_dir,
        ..DownloadRequest::default()
    };

    if opts.audio {
        request.mode = DownloadMode::Audio;
    }
    if let Some(quality) = &opts.quality {
        request.quality = quality.clone();
    }
    request.playlist = opts.playlist;
    request.playlist_items = opts.items.clone();
    request.embed_subs = opts.subs;
    request.auto_subs = opts.auto_subs;
    if let Some(lang) = &opts.sub_lang {
        request.sub_language = lang.clone();
    }
    request.sponsorblock = opts.sponsorblock;
    request.safe_mode = opts.safe_mode;
    request.trim_start = opts.trim_start.clone();
    request.trim_end = opts.trim_end.clone();

    if let Some(client) = &opts.client {
        request.client = client.clone();
    } else if !settings.client_spoof.is_empty() {
        request.client = settings.client_spoof.clone();
    }

    if let Some(cookies) = &opts.cookies {
        request.cookies_path = Some(cookies.clone());
    } else if !settings.cookies_path.is_empty() {
        request.cookies_path = Some(PathBuf::from(&settings.cookies_path));
    }

    Ok(request)
}

fn drain(buffer: &LogBuffer) {
    if buffer.has_changed() {
        if let Some(line) = buffer.last_line() {
            println!("{line}");
        }
        buffer.mark_read();
    }
}

fn cmd_download(rest: &[String]) -> Result<(), String> {
    let (positionals, opts) = parse_request_flags(rest)?;
    let url = positionals
        .first()
        .ok_or_else(|| "download requires a URL (try --help)".to_string())?
        .clone();
    require_http_url(&url)?;

    let paths = app_paths()?;
    db::ensure_schema(&paths).map_err(|e| e.to_string())?;
    let conn = db::open(&paths).map_err(|e| e.to_string())?;
    let settings = db::load_settings(&conn).map_err(|e| e.to_string())?;

    let request = build_request(url.clone(), &opts, &settings)?;
    let out_dir = request.output_dir.clone();

    let manager = BinaryManager::new(paths.clone());
    let engine = Engine::new(manager.resolved_path());

    let title = engine.resolve_title(&url);
    println!("Title: {title}");

    let buffer = Arc::new(LogBuffer::new(LOG_CAPACITY));
    let writer = Arc::clone(&buffer);
    let worker =
        thread::spawn(move || engine.download(&request, |event| writer.write(&event.text)));

    loop {
        drain(&buffer);
        if worker.is_finished() {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }
    // Lines written between the last poll and thread exit.
    drain(&buffer);

    worker
        .join()
        .map_err(|_| "download worker panicked".to_string())?
        .map_err(|e| e.to_string())?;

    let out_display = out_dir.to_string_lossy();
    db::append_history(&conn, &title, &url, &out_display).map_err(|e| e.to_string())?;
    db::set_setting(&conn, db::SETTING_LAST_SAVE_PATH, &out_display)
        .map_err(|e| e.to_string())?;
    println!("Done: {out_display}");
    Ok(())
}

fn cmd_batch(rest: &[String]) -> Result<(), String> {
    let (positionals, opts) = parse_request_flags(rest)?;
    let source = positionals
        .first()
        .ok_or_else(|| "batch requires a URL list file, or - for stdin (try --help)".to_string())?;

    let text = if source == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|e| e.to_string())?;
        text
    } else {
        std::fs::read_to_string(source).map_err(|e| e.to_string())?
    };

    let urls = normalize_batch_input(&text);
    if urls.is_empty() {
        return Err("no usable http(s) URLs in the input".to_string());
    }

    let paths = app_paths()?;
    db::ensure_schema(&paths).map_err(|e| e.to_string())?;
    let conn = db::open(&paths).map_err(|e| e.to_string())?;
    let settings = db::load_settings(&conn).map_err(|e| e.to_string())?;

    let base = build_request(String::new(), &opts, &settings)?;
    let out_display = base.output_dir.to_string_lossy().to_string();

    let manager = BinaryManager::new(paths.clone());
    let engine = Engine::new(manager.resolved_path());

    println!("Batch of {} URLs", urls.len());
    let summary = engine.run_batch(
        &urls,
        &base,
        |index, total, event| println!("[{}/{}] {}", index + 1, total, event.text),
        |outcome| match &outcome.error {
            None => {
                println!("[{}] done: {}", outcome.index + 1, outcome.title);
                if let Err(e) = db::append_history(&conn, &outcome.title, &outcome.url, &out_display)
                {
                    log::warn!("history write failed: {e}");
                }
            }
            Some(err) => println!("[{}] failed: {err}", outcome.index + 1),
        },
    );

    println!(
        "Batch finished: {} of {} succeeded, {} failed",
        summary.succeeded, summary.total, summary.failed
    );
    if summary.failed > 0 {
        return Err(format!(
            "{} of {} downloads failed",
            summary.failed, summary.total
        ));
    }
    Ok(())
}

fn cmd_probe(rest: &[String]) -> Result<(), String> {
    if rest.len() != 1 {
        return Err("probe requires exactly one URL (try --help)".to_string());
    }
    let url = &rest[0];
    require_http_url(url)?;

    let paths = app_paths()?;
    let engine = Engine::new(BinaryManager::new(paths).resolved_path());
    let meta = engine.get_metadata(url).map_err(|e| e.to_string())?;
    let json = serde_json::to_string_pretty(&meta).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

fn cmd_history(rest: &[String]) -> Result<(), String> {
    let mut limit = db::HISTORY_DEFAULT_LIMIT;

    let mut i = 0;
    while i < rest.len() {
        match rest[i].as_str() {
            "--limit" => {
                i += 1;
                let v = flag_value(rest, i, "--limit")?;
                limit = v.parse().map_err(|_| format!("bad --limit value: {v}"))?;
            }
            other => return Err(format!("unknown arg: {other} (try --help)")),
        }
        i += 1;
    }

    let paths = app_paths()?;
    db::ensure_schema(&paths).map_err(|e| e.to_string())?;
    let conn = db::open(&paths).map_err(|e| e.to_string())?;
    let rows = db::recent_history(&conn, limit).map_err(|e| e.to_string())?;

    if rows.is_empty() {
        println!("No downloads recorded yet.");
        return Ok(());
    }
    for row in rows {
        println!("{:>5}  {}  {}  ({})", row.id, row.title, row.url, row.path);
    }
    Ok(())
}

fn cmd_tool_status() -> Result<(), String> {
    let paths = app_paths()?;
    let status = BinaryManager::new(paths).status();
    let json = serde_json::to_string_pretty(&status).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

fn cmd_update_tool() -> Result<(), String> {
    let paths = app_paths()?;
    let manager = BinaryManager::new(paths);
    manager
        .update_binary(|line| println!("{line}"))
        .map_err(|e| e.to_string())?;
    Ok(())
}

fn cmd_self_update(rest: &[String]) -> Result<(), String> {
    let mut check_only = false;
    let mut restart = false;

    let mut i = 0;
    while i < rest.len() {
        match rest[i].as_str() {
            "--check" => check_only = true,
            "--restart" => restart = true,
            other => return Err(format!("unknown arg: {other} (try --help)")),
        }
        i += 1;
    }

    let updater = AppUpdater::new();
    println!("Current version: {APP_VERSION}");

    let Some(update) = updater.check_for_update().map_err(|e| e.to_string())? else {
        println!("Already up to date.");
        return Ok(());
    };

    println!("Update available: {}", update.version);
    if check_only {
        return Ok(());
    }

    let mut last_pct = -10i64;
    updater
        .apply_update(&update.download_url, |fraction| {
            let pct = (fraction * 100.0) as i64;
            if pct >= last_pct + 10 || (pct == 100 && last_pct < 100) {
                println!("Downloading update: {pct}%");
                last_pct = pct;
            }
        })
        .map_err(|e| e.to_string())?;
    println!("Update installed: {}", update.version);

    if restart {
        println!("Restarting...");
        updater.restart().map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn print_help() {
    println!(
        r#"tubefetch {APP_VERSION}

yt-dlp driver: downloads, metadata probes, download history, and managed
binary updates.

Usage:
  tubefetch download <url> [options]
  tubefetch batch <file|-> [options]
  tubefetch probe <url>
  tubefetch history [--limit <n>]
  tubefetch tool-status
  tubefetch update-tool
  tubefetch self-update [--check] [--restart]

Download options:
  --out <dir>          Save directory (default: last used, then ~/Downloads)
  --audio              Audio only
  --quality <q>        Video: Best, 4k, 1080p, 720p. Audio: mp3, m4a, best
  --playlist           Download the whole playlist
  --items <list>       Playlist items, e.g. 1-5,8 (with --playlist)
  --subs               Embed subtitles
  --auto-subs          Include auto-generated subtitles
  --sub-lang <lang>    Subtitle language (default: en)
  --sponsorblock       Remove sponsored segments
  --safe-mode          Minimal flags for sources that choke on extras
  --trim-start <ts>    Clip start, e.g. 0:30
  --trim-end <ts>      Clip end, e.g. 1:45
  --client <name>      Player client spoof, e.g. TV
  --cookies <path>     cookies.txt for age-restricted videos

The base directory comes from TUBEFETCH_BASE_DIR when set.
"#
    );
}
