use std::io;

use stencil::error::Error;

#[test]
fn test_error_conversion() {
    let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
    let err: Error = io_err.into();

    match err {
        Error::IoError(_) => (),
        _ => panic!("Expected IoError variant"),
    }
}

#[test]
fn test_error_display() {
    let err = Error::ConfigError("invalid config".to_string());
    assert_eq!(err.to_string(), "Configuration error: invalid config.");

    let err = Error::ProfileSyntaxError {
        path: "profile.yaml".to_string(),
        line: 3,
        message: "missing ':' separator".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "Profile syntax error in 'profile.yaml' at line 3: missing ':' separator."
    );

    let err = Error::ValidationError { errors: vec!["one".to_string(), "two".to_string()] };
    assert_eq!(err.to_string(), "Validation failed with 2 error(s):\none\ntwo");
}

#[test]
fn test_substitution_error_names_path() {
    let err = Error::substitution("work/private/a.txt", io::Error::other("disk full"));
    assert_eq!(err.to_string(), "Failed to process 'work/private/a.txt': disk full.");
}
