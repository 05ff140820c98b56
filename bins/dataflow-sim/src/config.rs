use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use dataset::parse_timestamp;
use pipeline::SinkConfig;
use replay_api::DelayMode;

use crate::error::SimError;

#[derive(Parser)]
#[command(name = "dataflow-sim", about = "Воспроизведение датасета в лог событий в реальном темпе")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Вычислить задержки и записать <name>_processed.csv
    Prepare(PrepareArgs),
    /// Отправить датасет в sink'и с задержками между событиями
    Stream(StreamArgs),
    /// Разделить датасет на <name>_historic.csv и <name>_new.csv по дате
    Split(SplitArgs),
}

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug, Default)]
pub struct DatasetArgs {
    /// Путь к TOML конфиг файлу
    #[arg(long, default_value = "dataflow.toml", env = "DATAFLOW_SIM_CONFIG")]
    pub config: String,

    /// CSV файл датасета
    #[arg(long)]
    pub file: Option<String>,

    /// Подготовленный файл (по умолчанию <name>_processed.csv рядом с исходным)
    #[arg(long)]
    pub processed: Option<String>,

    /// Время первого события, напр. "2024-08-19 09:00:00"
    #[arg(long)]
    pub first_event_dt: Option<String>,

    /// Статическая задержка между событиями в мс (> 0)
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Колонка с timestamp'ами для вычисления задержек
    #[arg(long)]
    pub colname_dt: Option<String>,

    /// Добавлять задержки между событиями (delay_ms или colname_dt).
    /// По умолчанию выключено: события уходят без пауз
    #[arg(long, conflicts_with = "no_delay")]
    pub apply_delay: bool,

    /// Не добавлять задержки, даже если в конфиге apply_delay = true
    #[arg(long)]
    pub no_delay: bool,

    /// Сдвинуть timestamp'ы так, чтобы первое событие пришлось на first_event_dt
    #[arg(long)]
    pub rebase: bool,
}

#[derive(Args, Clone, Debug)]
pub struct PrepareArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Куда записать результат (по умолчанию <name>_processed.csv рядом с исходным)
    #[arg(long)]
    pub output: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct StreamArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Вычислить задержки перед отправкой (иначе файл должен быть уже подготовлен)
    #[arg(long)]
    pub derive: bool,

    /// Завершиться с ошибкой, если отказов больше N
    #[arg(long)]
    pub max_failures: Option<usize>,

    /// Логировать прогресс каждые N строк (0 = выключено)
    #[arg(long, default_value_t = 500)]
    pub progress_every: usize,
}

#[derive(Args, Clone, Debug)]
pub struct SplitArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Граница: строки раньше неё — historic, остальные — new
    #[arg(long)]
    pub cutoff: String,
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dataset: DatasetSection,
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DatasetSection {
    pub filepath: Option<String>,
    pub filepath_processed: Option<String>,
    pub first_event_dt: Option<String>,
    pub apply_delay: Option<bool>,
    pub delay_ms: Option<u64>,
    pub colname_dt: Option<String>,
    pub rebase_timestamps: Option<bool>,
}

pub fn load_config(path: &str) -> Result<Config, SimError> {
    let content = std::fs::read_to_string(path).map_err(|e| SimError::Config {
        context: "read",
        detail: format!("'{path}': {e}"),
    })?;
    toml::from_str(&content).map_err(|e| SimError::Config {
        context: "parse",
        detail: format!("'{path}': {e}"),
    })
}

// ═══════════════════════════════════════════════════════════════
//  Effective — merged config
// ═══════════════════════════════════════════════════════════════

/// Итоговая конфигурация после мержа: config file < CLI/env.
#[derive(Debug)]
pub struct Effective {
    pub filepath: String,
    /// Куда `prepare` пишет результат и откуда `stream` его читает.
    pub processed_path: PathBuf,
    pub start_time: Option<DateTime<Utc>>,
    pub apply_delay: bool,
    pub delay_ms: u64,
    /// Колонка с timestamp'ами, если задана (нужна и для rebase/split).
    pub colname_dt: Option<String>,
    pub rebase: bool,
    pub sinks: Vec<SinkConfig>,
}

impl Effective {
    /// Прочитать конфиг (отсутствующий файл — не ошибка) и смержить с аргументами.
    pub fn new(args: &DatasetArgs) -> Result<Self, SimError> {
        let cfg = match load_config(&args.config) {
            Ok(c) => c,
            Err(e) => {
                if std::path::Path::new(&args.config).exists() {
                    return Err(e);
                }
                Config::default()
            }
        };
        Self::merge(args, cfg)
    }

    pub fn merge(args: &DatasetArgs, cfg: Config) -> Result<Self, SimError> {
        let ds = cfg.dataset;

        let filepath = args
            .file
            .clone()
            .or(ds.filepath)
            .ok_or_else(|| SimError::Config {
                context: "dataset",
                detail: "no dataset file: pass --file or set [dataset].filepath".into(),
            })?;

        let start_time = match args.first_event_dt.clone().or(ds.first_event_dt) {
            Some(raw) => Some(parse_timestamp(&raw).ok_or_else(|| SimError::Config {
                context: "dataset",
                detail: format!("cannot parse first_event_dt {raw:?}"),
            })?),
            None => None,
        };

        let colname_dt = args
            .colname_dt
            .clone()
            .or(ds.colname_dt)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let processed_path = args
            .processed
            .clone()
            .or(ds.filepath_processed)
            .map(PathBuf::from)
            .unwrap_or_else(|| dataset::processed_path(Path::new(&filepath)));

        Ok(Self {
            filepath,
            processed_path,
            start_time,
            apply_delay: !args.no_delay && (args.apply_delay || ds.apply_delay.unwrap_or(false)),
            delay_ms: args.delay_ms.or(ds.delay_ms).unwrap_or(0),
            colname_dt,
            rebase: args.rebase || ds.rebase_timestamps.unwrap_or(false),
            sinks: cfg.sinks,
        })
    }

    /// Режим задержек; нужен только когда задержки вычисляются.
    pub fn delay_mode(&self) -> Result<DelayMode, SimError> {
        resolve_delay_mode(self.apply_delay, self.delay_ms, self.colname_dt.as_deref())
    }

    pub fn timestamp_column(&self) -> Result<&str, SimError> {
        self.colname_dt.as_deref().ok_or_else(|| SimError::Config {
            context: "dataset",
            detail: "no timestamp column: pass --colname-dt or set [dataset].colname_dt".into(),
        })
    }
}

/// `apply_delay = false` → `None`; `delay_ms > 0` → `Static`;
/// иначе колонка timestamp'ов → `TimestampDiff`.
pub fn resolve_delay_mode(apply_delay: bool, delay_ms: u64, colname_dt: Option<&str>) -> Result<DelayMode, SimError> {
    if !apply_delay {
        return Ok(DelayMode::None);
    }
    if delay_ms > 0 {
        return Ok(DelayMode::Static(delay_ms));
    }
    match colname_dt {
        Some(col) => Ok(DelayMode::TimestampDiff(col.to_string())),
        None => Err(SimError::Config {
            context: "dataset",
            detail: "apply_delay is set: specify delay_ms > 0 or colname_dt".into(),
        }),
    }
}
