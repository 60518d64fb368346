use anyhow::Result;
use chrono::Utc;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::gps_processor::{GpsFix, ProcessResult};
use crate::kv_store::{Setting, SqliteKvStore};

pub struct RawDataFile {
    pub name: String,
    pub path: String,
}

/* This is an optional feature that should be off by default: storing every
   raw fix we receive together with the filter decision. It is designed for
   debugging the filter thresholds. Data goes to a simple csv file and a new
   file is used every time recording is (re)enabled.
*/
pub struct RawDataRecorder {
    dir: PathBuf,
    file: Option<File>,
}

fn raw_data_dir(support_dir: &str) -> PathBuf {
    Path::new(support_dir).join("raw_data/")
}

impl RawDataRecorder {
    pub fn init(support_dir: &str) -> Result<RawDataRecorder> {
        let dir = raw_data_dir(support_dir);
        std::fs::create_dir_all(&dir)?;
        Ok(RawDataRecorder { dir, file: None })
    }

    /// Returns a recorder iff raw data mode is turned on in the settings.
    pub fn from_setting(kv: &SqliteKvStore, support_dir: &str) -> Result<Option<RawDataRecorder>> {
        if kv.get_setting_with_default(Setting::RawDataMode, false) {
            Ok(Some(RawDataRecorder::init(support_dir)?))
        } else {
            Ok(None)
        }
    }

    fn open_new_file(&self) -> Result<File> {
        let timestamp_sec = Utc::now().timestamp();
        let mut i = 0;
        let filename = loop {
            let filename = self.dir.join(format!("gps-{}-{}.csv", timestamp_sec, i));
            if std::fs::metadata(&filename).is_err() {
                break filename;
            }
            i += 1;
        };
        debug!("[raw_data_recorder] new file: {:?}", filename);
        let mut file = File::create(filename)?;
        file.write_all(
            "timestamp_ms,latitude,longitude,accuracy,altitude,speed,source,process_result\n"
                .as_bytes(),
        )?;
        Ok(file)
    }

    pub fn record(
        &mut self,
        fix: &GpsFix,
        source: &str,
        process_result: ProcessResult,
    ) -> Result<()> {
        let file = match self.file.take() {
            Some(file) => file,
            None => self.open_new_file()?,
        };
        let file = self.file.insert(file);
        let optional = |x: Option<f64>| x.map(|x| x.to_string()).unwrap_or_default();
        writeln!(
            file,
            "{},{},{},{},{},{},{},{}",
            fix.timestamp.timestamp_millis(),
            fix.latitude,
            fix.longitude,
            optional(fix.accuracy),
            optional(fix.altitude),
            optional(fix.speed),
            source,
            process_result.to_int()
        )?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(ref mut file) = self.file {
            file.flush()?;
        }
        Ok(())
    }
}

pub fn set_raw_data_mode(kv: &SqliteKvStore, enable: bool) -> Result<()> {
    debug!("[raw_data_recorder] raw data mode: {}", enable);
    kv.set_setting(Setting::RawDataMode, enable)
}

pub fn list_all_raw_data(support_dir: &str) -> Result<Vec<RawDataFile>> {
    let dir = raw_data_dir(support_dir);
    let mut result = Vec::new();
    if !dir.exists() {
        return Ok(result);
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let name = match path.file_name().and_then(|x| x.to_str()) {
            Some(name) if name.ends_with(".csv") => name.to_string(),
            _ => continue,
        };
        let path = path
            .to_str()
            .ok_or_else(|| anyhow!("non utf-8 path: {:?}", path))?
            .to_owned();
        result.push(RawDataFile { name, path });
    }
    result.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(result)
}
