use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// What the final button press does with the filled form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveMode {
    Draft,
    Preview,
    Publish,
}

impl SaveMode {
    /// Label of the button on the upload surface.
    pub fn button_label(&self) -> &'static str {
        match self {
            SaveMode::Draft => "保存草稿",
            SaveMode::Preview => "手机预览",
            SaveMode::Publish => "发表",
        }
    }
}

impl fmt::Display for SaveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveMode::Draft => write!(f, "save_draft"),
            SaveMode::Preview => write!(f, "preview"),
            SaveMode::Publish => write!(f, "publish"),
        }
    }
}

impl FromStr for SaveMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "draft" | "save_draft" | "保存草稿" => Ok(SaveMode::Draft),
            "preview" | "手机预览" => Ok(SaveMode::Preview),
            "publish" | "发表" => Ok(SaveMode::Publish),
            other => Err(format!("unsupported save mode: {other}")),
        }
    }
}

/// Descriptive form fields. Empty strings mean "leave untouched".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFields {
    pub description: String,
    pub location: String,
    pub collection: String,
    pub link: String,
    pub activity: String,
    pub short_title: String,
}

/// One validated publishing job. Immutable once built by the sheet validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Sheet row number; unique within a run.
    pub row: usize,
    pub fields: JobFields,
    pub scheduled: bool,
    pub schedule_at: Option<NaiveDateTime>,
    pub mode: SaveMode,
    pub asset: PathBuf,
}

impl Job {
    pub fn new(row: usize, asset: impl Into<PathBuf>, mode: SaveMode) -> Self {
        Self {
            row,
            fields: JobFields::default(),
            scheduled: false,
            schedule_at: None,
            mode,
            asset: asset.into(),
        }
    }

    pub fn with_fields(mut self, fields: JobFields) -> Self {
        self.fields = fields;
        self
    }

    pub fn scheduled_at(mut self, at: NaiveDateTime) -> Self {
        self.scheduled = true;
        self.schedule_at = Some(at);
        self
    }

    pub fn asset_name(&self) -> String {
        self.asset
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.asset.display().to_string())
    }
}
