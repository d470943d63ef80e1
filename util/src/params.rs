//! Generic parameters functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("The software root environment variable (OGM_SW_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot load the parameter file {0:?}: {1}")]
    FileLoadError(PathBuf, std::io::Error),

    #[error("Cannot read the parameter file {0:?}: {1}")]
    DeserialiseError(PathBuf, toml::de::Error),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the full path to a parameter file.
///
/// Absolute paths are returned as they are, relative paths are taken from the "params"
/// directory under the software root.
pub fn resolve<P: AsRef<Path>>(param_file_path: P) -> Result<PathBuf, LoadError> {
    if param_file_path.as_ref().is_absolute() {
        return Ok(param_file_path.as_ref().to_path_buf());
    }

    let mut path = crate::host::get_sw_root().map_err(|_| LoadError::SwRootNotSet)?;
    path.push("params");
    path.push(param_file_path);

    Ok(path)
}

/// Load a parameter file
///
/// The file path is relative to the "params" directory, see [`resolve`].
pub fn load<P, F>(param_file_path: F) -> Result<P, LoadError>
where
    P: DeserializeOwned,
    F: AsRef<Path>,
{
    load_from_path(resolve(param_file_path)?)
}

/// Load a parameter file from an exact path.
pub fn load_from_path<P, F>(path: F) -> Result<P, LoadError>
where
    P: DeserializeOwned,
    F: AsRef<Path>,
{
    let path = path.as_ref().to_path_buf();

    // Load the file into a string
    let params_str = match read_to_string(&path) {
        Ok(s) => s,
        Err(e) => return Err(LoadError::FileLoadError(path, e)),
    };

    // Parse the string into the parameter struct
    toml::from_str(params_str.as_str()).map_err(|e| LoadError::DeserialiseError(path, e))
}

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Dummy {
        resolution_m: f64,
        name: String,
    }

    #[test]
    fn test_load_from_path() {
        let path = std::env::temp_dir().join("util_params_test_load.toml");
        std::fs::write(&path, "resolution_m = 0.5\nname = \"grid\"\n").unwrap();

        let d: Dummy = load_from_path(&path).unwrap();
        assert_eq!(
            d,
            Dummy {
                resolution_m: 0.5,
                name: "grid".into()
            }
        );

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_errors() {
        let missing = std::env::temp_dir().join("util_params_test_missing.toml");
        assert!(matches!(
            load_from_path::<Dummy, _>(&missing),
            Err(LoadError::FileLoadError(..))
        ));

        let bad = std::env::temp_dir().join("util_params_test_bad.toml");
        std::fs::write(&bad, "resolution_m = \"wide\"\n").unwrap();
        assert!(matches!(
            load_from_path::<Dummy, _>(&bad),
            Err(LoadError::DeserialiseError(..))
        ));
        std::fs::remove_file(&bad).unwrap();
    }

    #[test]
    fn test_resolve_absolute() {
        let abs = std::env::temp_dir().join("x.toml");
        assert_eq!(resolve(&abs).unwrap(), abs);
    }
}
