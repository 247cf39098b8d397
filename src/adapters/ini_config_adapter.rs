//! INI configuration adapter backed by `configparser`.

use crate::domain::error::ChanError;
use crate::ports::config_port::{ConfigPort, parse_bool};
use configparser::ini::Ini;
use std::path::Path;

pub struct IniConfigAdapter {
    ini: Ini,
}

impl IniConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ChanError> {
        let mut ini = Ini::new_cs();
        ini.load(path.as_ref()).map_err(|e| {
            ChanError::Io(std::io::Error::other(format!(
                "{}: {e}",
                path.as_ref().display()
            )))
        })?;
        Ok(Self { ini })
    }

    pub fn from_string(content: &str) -> Result<Self, ChanError> {
        let mut ini = Ini::new_cs();
        ini.read(content.to_string())
            .map_err(|reason| ChanError::ConfigInvalid {
                section: String::new(),
                key: String::new(),
                reason,
            })?;
        Ok(Self { ini })
    }
}

impl ConfigPort for IniConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.ini.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.ini.getint(section, key).ok().flatten().unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.ini
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.ini
            .get(section, key)
            .as_deref()
            .and_then(parse_bool)
            .unwrap_or(default)
    }
}
