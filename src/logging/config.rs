use std::{
    collections::BTreeMap,
    fmt, fs,
    path::PathBuf,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

/// Формат вывода логов.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: Option<LogFormat>,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: None,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub enabled: bool,
    /// Имя файла (к нему добавляется дата ротации).
    pub filename: String,
    pub format: Option<LogFormat>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            filename: "mcs-bus.log".to_string(),
            format: Some(LogFormat::Json),
        }
    }
}

/// Конфигурация подсистемы логирования.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Базовый уровень (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Формат по умолчанию для всех sinks.
    pub format: LogFormat,
    pub log_dir: PathBuf,
    pub console: ConsoleConfig,
    pub file: FileConfig,
    /// Уровни для отдельных модулей, например `mcs_bus::pubsub = "debug"`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            log_dir: PathBuf::from("logs"),
            console: ConsoleConfig::default(),
            file: FileConfig::default(),
            modules: BTreeMap::new(),
        }
    }
}

const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), String> {
        let check = |lvl: &str| {
            if LEVELS.contains(&lvl.to_ascii_lowercase().as_str()) {
                Ok(())
            } else {
                Err(format!("invalid log level '{lvl}'"))
            }
        };

        check(&self.level)?;
        for (module, lvl) in &self.modules {
            check(lvl).map_err(|e| format!("{e} for module '{module}'"))?;
        }
        if self.file.enabled && self.file.filename.is_empty() {
            return Err("log file name must not be empty".to_string());
        }
        Ok(())
    }

    pub fn ensure_log_dir(&self) -> std::io::Result<()> {
        if self.file.enabled {
            fs::create_dir_all(&self.log_dir)?;
        }
        Ok(())
    }

    /// Директива для `EnvFilter`, например `info,mcs_bus::pubsub=debug`.
    pub fn build_filter_directive(&self) -> String {
        let mut directive = self.level.to_ascii_lowercase();
        for (module, lvl) in &self.modules {
            directive.push_str(&format!(",{module}={}", lvl.to_ascii_lowercase()));
        }
        directive
    }

    pub fn console_format(&self) -> LogFormat {
        self.console.format.unwrap_or(self.format)
    }

    pub fn file_format(&self) -> LogFormat {
        self.file.format.unwrap_or(self.format)
    }
}
