use ephys_qc::QcError;

pub const SUCCESS: i32 = 0;
pub const EXECUTION_ERROR: i32 = 1;
pub const INPUT_ERROR: i32 = 2;
pub const CONFIG_ERROR: i32 = 3;

/// Exit code for a library failure.
pub fn for_error(err: &QcError) -> i32 {
    match err {
        QcError::ConfigError(_) => CONFIG_ERROR,
        QcError::IoError(_) => EXECUTION_ERROR,
        _ => INPUT_ERROR,
    }
}
