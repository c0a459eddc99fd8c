use brisk::app::Context;
use brisk::config::{AppConfig, LogHandler};
use brisk::logger::{FileLogger, Level, Log, Logger};
use brisk::server::{Environment, Interface};
use brisk::Flow;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_file_logger_layout() {
    let dir = TempDir::new().unwrap();
    let logger = FileLogger::new(dir.path(), 1024 * 1024);
    logger.write("first", Level::Info, None).unwrap();
    logger.write("second", Level::Info, None).unwrap();
    logger.write("boom", Level::Error, Some("payments")).unwrap();

    let info = logger.file_for(Level::Info, None);
    assert!(info.ends_with("info/common.log"));
    assert_eq!(fs::read_to_string(&info).unwrap(), "first\r\nsecond\r\n");

    let payments = logger.file_for(Level::Error, Some("payments"));
    assert!(payments.ends_with("error/payments.log"));
    assert_eq!(fs::read_to_string(payments).unwrap(), "boom\r\n");
}

#[test]
fn test_file_logger_rotates_full_files() {
    let dir = TempDir::new().unwrap();
    let logger = FileLogger::new(dir.path(), 16);
    logger.write("0123456789abcdef", Level::Warn, None).unwrap();
    logger.write("next", Level::Warn, None).unwrap();

    let current = logger.file_for(Level::Warn, None);
    assert_eq!(fs::read_to_string(&current).unwrap(), "next\r\n");
    let names = files_in(current.parent().unwrap());
    assert_eq!(names.len(), 2);
    assert!(names.iter().any(|n| n.ends_with("-common.log")));
}

#[test]
fn test_buffered_records_reach_files() {
    let dir = TempDir::new().unwrap();
    let file_logger = FileLogger::new(dir.path(), 1024);
    let log = Log::new(Arc::new(file_logger.clone()));
    log.record("one", Level::Notice);
    log.record("two", Level::Notice);
    assert!(!file_logger.file_for(Level::Notice, Some("batch")).exists());
    log.save(Some("batch"));
    let path = file_logger.file_for(Level::Notice, Some("batch"));
    assert_eq!(fs::read_to_string(path).unwrap(), "one\r\ntwo\r\n");
}

#[test]
fn test_application_faults_are_logged_to_file() {
    let dir = TempDir::new().unwrap();
    let mut config = AppConfig::default();
    config.log.handler = LogHandler::File;
    config.log.log_path = dir.path().to_path_buf();
    let mut app = brisk::Application::new(config);
    app.get("/boom", |_ctx: &mut Context<'_>| -> Flow {
        Err(anyhow::anyhow!("ledger out of balance").into())
    })
    .unwrap();

    let env = Environment::mock("GET", "/boom").with_interface(Interface::Console);
    assert_eq!(app.run(env).status, 500);

    let path = FileLogger::new(dir.path(), 1024).file_for(Level::Error, None);
    let contents = fs::read_to_string(path).unwrap();
    assert!(contents.contains("127.0.0.1 /boom"));
    assert!(contents.contains("ledger out of balance"));
}

#[test]
fn test_context_log_uses_level_directory() {
    let dir = TempDir::new().unwrap();
    let logger = FileLogger::new(dir.path(), 1024);
    let mut app = brisk::Application::default().with_logger(Arc::new(logger.clone()));
    app.get("/audit", |ctx: &mut Context<'_>| {
        ctx.log(Level::Info, "audited");
        Ok(())
    })
    .unwrap();
    let env = Environment::mock("GET", "/audit").with_interface(Interface::Console);
    assert_eq!(app.run(env).status, 200);
    let contents = fs::read_to_string(logger.file_for(Level::Info, None)).unwrap();
    assert!(contents.ends_with("audited\r\n"));
}
