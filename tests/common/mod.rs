//! In-memory stand-in for the ExifTool executable.
//!
//! Images are plain (possibly empty) files on disk so path checks behave; their
//! tags live in a map keyed by path. The fake understands exactly the argument
//! shapes the command builder produces.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use exif_vault::MetadataEngine;
use exif_vault::exif::{Invocation, ToolOutput, ToolRunner};

/// Tags the fake reports but refuses to write.
const READ_ONLY: &[&str] = &["ImageWidth", "ImageHeight"];

#[derive(Default)]
pub struct FakeExifTool {
    files: Mutex<HashMap<PathBuf, Map<String, Value>>>,
    broken: Mutex<HashSet<PathBuf>>,
}

impl FakeExifTool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create `path` on disk and register its tags.
    pub fn add_image(&self, path: &Path, tags: &[(&str, &str)]) {
        std::fs::write(path, b"\xff\xd8\xff\xd9").unwrap();
        let mut map = Map::new();
        map.insert("ImageWidth".into(), json!(640));
        map.insert("ImageHeight".into(), json!(480));
        for (k, v) in tags {
            map.insert(k.to_string(), json!(v));
        }
        self.files.lock().unwrap().insert(path.to_path_buf(), map);
    }

    /// Make every write to `path` fail.
    pub fn break_file(&self, path: &Path) {
        self.broken.lock().unwrap().insert(path.to_path_buf());
    }

    pub fn tags(&self, path: &Path) -> Map<String, Value> {
        self.files.lock().unwrap()[path].clone()
    }

    fn read(&self, file: &Path) -> ToolOutput {
        let files = self.files.lock().unwrap();
        let Some(tags) = files.get(file) else {
            return failure(&format!("Error: File not found - {}", file.display()));
        };
        let mut record = Map::new();
        record.insert("SourceFile".into(), json!(file.display().to_string()));
        record.insert(
            "FileName".into(),
            json!(file.file_name().unwrap().to_string_lossy()),
        );
        record.insert(
            "Directory".into(),
            json!(file.parent().unwrap().display().to_string()),
        );
        record.insert("FileSize".into(), json!("4 bytes"));
        record.insert("FileModifyDate".into(), json!("2024:05:01 10:00:00+00:00"));
        record.extend(tags.clone());
        success(&serde_json::to_string(&Value::Array(vec![Value::Object(record)])).unwrap())
    }

    fn write(&self, file: &Path, args: &[String]) -> ToolOutput {
        if self.broken.lock().unwrap().contains(file) {
            return ToolOutput {
                success: false,
                code: Some(1),
                stdout: "    0 image files updated\n    1 files weren't updated due to errors\n"
                    .to_string(),
                stderr: format!("Error: Not a valid JPG - {}\n", file.display()),
            };
        }
        let mut files = self.files.lock().unwrap();
        let Some(tags) = files.get_mut(file) else {
            return failure(&format!("Error: File not found - {}", file.display()));
        };

        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];
            i += 1;
            match arg.as_str() {
                "-overwrite_original" => continue,
                "-charset" | "-api" => {
                    i += 1;
                    continue;
                }
                "-all=" => {
                    tags.clear();
                    continue;
                }
                _ => {}
            }

            let Some(assignment) = arg.strip_prefix('-') else {
                continue;
            };
            let (tag, value) = if let Some((tag, path)) = assignment.split_once("<=") {
                (tag, Some(std::fs::read_to_string(path).unwrap()))
            } else if let Some((tag, raw)) = assignment.split_once('=') {
                let value = (!raw.is_empty()).then(|| unescape(raw));
                (tag, value)
            } else {
                continue;
            };
            let (group, name) = match tag.split_once(':') {
                Some((g, n)) => (Some(g), n),
                None => (None, tag),
            };

            if READ_ONLY.iter().any(|t| t.eq_ignore_ascii_case(name)) {
                return ToolOutput {
                    success: false,
                    code: Some(1),
                    stdout: String::new(),
                    stderr: format!("Warning: Sorry, {name} is not writable\nNothing to do.\n"),
                };
            }

            match value {
                Some(v) => {
                    tags.insert(name.to_string(), Value::String(v));
                }
                None if name.eq_ignore_ascii_case("all") => {
                    let prefix = group.unwrap_or_default().to_ascii_uppercase();
                    tags.retain(|k, _| !k.to_ascii_uppercase().starts_with(&prefix));
                }
                None => {
                    tags.retain(|k, _| !k.eq_ignore_ascii_case(name));
                }
            }
        }

        success("    1 image files updated\n")
    }
}

#[async_trait]
impl ToolRunner for FakeExifTool {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<ToolOutput> {
        let args: Vec<String> = invocation
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        if args.first().map(String::as_str) == Some("-ver") {
            return Ok(success("12.76\n"));
        }
        let file = PathBuf::from(args.last().unwrap());
        if args[0] == "-json" {
            return Ok(self.read(&file));
        }
        Ok(self.write(&file, &args[..args.len() - 1]))
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn success(stdout: &str) -> ToolOutput {
    ToolOutput {
        success: true,
        code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

fn failure(stderr: &str) -> ToolOutput {
    ToolOutput {
        success: false,
        code: Some(1),
        stdout: String::new(),
        stderr: format!("{stderr}\n"),
    }
}

/// Engine wired to `tool`, writing backups under `backup_dir`.
pub async fn engine(tool: &Arc<FakeExifTool>, backup_dir: &Path) -> MetadataEngine {
    MetadataEngine::builder()
        .runner(tool.clone())
        .backup_dir(backup_dir)
        .build()
        .await
        .unwrap()
}
