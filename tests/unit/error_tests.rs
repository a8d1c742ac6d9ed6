//! Unit tests for error display formatting and conversions.

use procwarden::AppError;

#[test]
fn display_prefixes_domain() {
    assert_eq!(AppError::Config("bad".into()).to_string(), "config: bad");
    assert_eq!(AppError::Lock("bad".into()).to_string(), "lock: bad");
    assert_eq!(AppError::Ipc("bad".into()).to_string(), "ipc: bad");
    assert_eq!(AppError::Session("bad".into()).to_string(), "session: bad");
    assert_eq!(AppError::Watch("bad".into()).to_string(), "watch: bad");
    assert_eq!(AppError::Io("bad".into()).to_string(), "io: bad");
}

#[test]
fn toml_errors_convert_to_config() {
    let err = toml::from_str::<toml::Value>("= broken").expect_err("invalid toml");
    let app: AppError = err.into();
    assert!(matches!(app, AppError::Config(_)));
}

#[test]
fn io_errors_convert_to_io() {
    let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let app: AppError = err.into();
    assert!(matches!(app, AppError::Io(_)));
}

#[test]
fn implements_std_error() {
    let err: Box<dyn std::error::Error> = Box::new(AppError::Ipc("down".into()));
    assert!(err.to_string().contains("down"));
}
