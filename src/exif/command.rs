use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

use super::fields::MetadataField;

/// Values longer than this (in bytes) are passed through a temporary file.
pub const INLINE_VALUE_LIMIT: usize = 10_000;

/// Flags shared by every command that rewrites a file.
const WRITE_FLAGS: &[&str] = &[
    "-overwrite_original",
    "-charset",
    "utf8",
    "-api",
    "largefilesupport=1",
];

/// Privacy-sensitive tags cleared by [`Operation::Strip`].
pub const STRIP_TAGS: &[&str] = &[
    "-gps:all=",
    "-exif:make=",
    "-exif:model=",
    "-exif:serialnumber=",
    "-exif:usercomment=",
    "-exif:makernotes=",
    "-xmp:creatortool=",
    "-iptc:by-line=",
];

/// What a single ExifTool invocation should do.
#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
    /// Query the tool version. Takes no file.
    Version,
    /// Dump every tag, duplicates included, as JSON.
    Read,
    /// Write one field.
    Set { field: &'a MetadataField, value: &'a str },
    /// Clear one field.
    DeleteField { field: &'a MetadataField },
    /// Clear GPS, camera identification and authoring tags.
    Strip,
    /// Clear everything writable.
    WipeAll,
}

impl Operation<'_> {
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Operation::Version | Operation::Read)
    }
}

/// A fully-built command line.
///
/// When the value was moved into a temporary file, the file lives as long as
/// the invocation and is removed by [`Invocation::cleanup`] (or on drop).
#[derive(Debug)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    value_file: Option<TempPath>,
}

impl Invocation {
    /// Path of the temporary value file, if one was needed.
    pub fn value_file(&self) -> Option<&Path> {
        self.value_file.as_deref()
    }

    /// Human-readable command line for logs.
    pub fn display(&self) -> String {
        let mut s = self.program.display().to_string();
        for arg in &self.args {
            s.push(' ');
            s.push_str(&arg.to_string_lossy());
        }
        s
    }

    /// Remove the temporary value file now, reporting any failure.
    pub fn cleanup(&mut self) -> std::io::Result<()> {
        match self.value_file.take() {
            Some(path) => path.close(),
            None => Ok(()),
        }
    }
}

/// Builds ExifTool command lines. Pure apart from the value file it may create.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    program: PathBuf,
    inline_limit: usize,
}

impl CommandBuilder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            inline_limit: INLINE_VALUE_LIMIT,
        }
    }

    pub fn with_inline_limit(mut self, limit: usize) -> Self {
        self.inline_limit = limit;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Build the command line for `op` on `file`.
    ///
    /// Only fails when a large value cannot be written to its temporary file.
    pub fn build(&self, file: &Path, op: Operation<'_>) -> std::io::Result<Invocation> {
        let mut args: Vec<OsString> = Vec::new();
        let mut value_file = None;

        match op {
            Operation::Version => {
                args.push("-ver".into());
                return Ok(self.finish(args, None));
            }
            Operation::Read => {
                for a in ["-json", "-all", "-duplicates", "-charset", "utf8"] {
                    args.push(a.into());
                }
            }
            Operation::Set { field, value } => {
                push_write_flags(&mut args);
                if value.len() > self.inline_limit {
                    let path = write_value_file(value)?;
                    let mut tag = OsString::from(format!("-{}<=", field.tag()));
                    tag.push(path.as_os_str());
                    args.push(tag);
                    value_file = Some(path);
                } else {
                    args.push(format!("-{}={}", field.tag(), escape_value(value)).into());
                }
            }
            Operation::DeleteField { field } => {
                push_write_flags(&mut args);
                args.push(format!("-{}=", field.tag()).into());
            }
            Operation::Strip => {
                push_write_flags(&mut args);
                args.extend(STRIP_TAGS.iter().map(|a| OsString::from(*a)));
            }
            Operation::WipeAll => {
                push_write_flags(&mut args);
                args.push("-all=".into());
            }
        }

        args.push(file.as_os_str().to_os_string());
        Ok(self.finish(args, value_file))
    }

    fn finish(&self, args: Vec<OsString>, value_file: Option<TempPath>) -> Invocation {
        Invocation {
            program: self.program.clone(),
            args,
            value_file,
        }
    }
}

fn push_write_flags(args: &mut Vec<OsString>) {
    args.extend(WRITE_FLAGS.iter().map(|a| OsString::from(*a)));
}

/// Escape backslashes and double quotes in an inline value.
///
/// Backslashes are escaped before quotes, so `a"b` becomes `a\"b`. Values
/// written by older tools that escaped quotes first (`a\\"b`) will not
/// byte-match.
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}

fn write_value_file(value: &str) -> std::io::Result<TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix("exif-vault-value-")
        .suffix(".txt")
        .tempfile()?;
    file.write_all(value.as_bytes())?;
    file.flush()?;
    // Close our handle so the tool can open the file on every platform.
    Ok(file.into_temp_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif::fields::{Category, FieldResolver};

    fn builder() -> CommandBuilder {
        CommandBuilder::new("exiftool")
    }

    fn args(inv: &Invocation) -> Vec<String> {
        inv.args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    // ── Read / Version ───────────────────────────────────────────────

    #[test]
    fn read_command_line() {
        let inv = builder().build(Path::new("a.jpg"), Operation::Read).unwrap();
        assert_eq!(args(&inv), ["-json", "-all", "-duplicates", "-charset", "utf8", "a.jpg"]);
        assert!(inv.value_file().is_none());
    }

    #[test]
    fn version_has_no_file() {
        let inv = builder().build(Path::new("ignored.jpg"), Operation::Version).unwrap();
        assert_eq!(args(&inv), ["-ver"]);
    }

    // ── Set ──────────────────────────────────────────────────────────

    #[test]
    fn set_with_category() {
        let field = FieldResolver::default().resolve("Keywords", None);
        let inv = builder()
            .build(Path::new("a.jpg"), Operation::Set { field: &field, value: "sea, sky" })
            .unwrap();
        assert_eq!(
            args(&inv),
            [
                "-overwrite_original",
                "-charset",
                "utf8",
                "-api",
                "largefilesupport=1",
                "-IPTC:Keywords=sea, sky",
                "a.jpg",
            ]
        );
    }

    #[test]
    fn set_without_category() {
        let field = FieldResolver::default().resolve("GPSCoordinates", Some(Category::Exif));
        let inv = builder()
            .build(Path::new("a.jpg"), Operation::Set { field: &field, value: "1, 2" })
            .unwrap();
        assert!(args(&inv).contains(&"-GPSPosition=1, 2".to_string()));
    }

    #[test]
    fn set_escapes_quotes_and_backslashes() {
        let field = FieldResolver::default().resolve("Title", None);
        let inv = builder()
            .build(Path::new("a.jpg"), Operation::Set { field: &field, value: r#"say "hi" \o/"# })
            .unwrap();
        assert!(args(&inv).contains(&r#"-XMP:Title=say \"hi\" \\o/"#.to_string()));
    }

    #[test]
    fn quote_escape_is_not_doubled() {
        assert_eq!(escape_value(r#"a"b"#), r#"a\"b"#);
        assert_eq!(escape_value(r"a\b"), r"a\\b");
        assert_eq!(escape_value(r#"a\"b"#), r#"a\\\"b"#);
    }

    #[test]
    fn large_value_goes_through_file() {
        let field = FieldResolver::default().resolve("Description", None);
        let value = "x".repeat(INLINE_VALUE_LIMIT + 1);
        let mut inv = builder()
            .build(Path::new("a.jpg"), Operation::Set { field: &field, value: &value })
            .unwrap();

        let temp = inv.value_file().unwrap().to_path_buf();
        assert_eq!(std::fs::read_to_string(&temp).unwrap(), value);

        let tag = &args(&inv)[5];
        assert_eq!(tag, &format!("-XMP:Description<={}", temp.display()));
        assert!(args(&inv).iter().all(|a| !a.contains(&value)));

        inv.cleanup().unwrap();
        assert!(!temp.exists());
    }

    #[test]
    fn value_at_limit_stays_inline() {
        let field = FieldResolver::default().resolve("Description", None);
        let value = "y".repeat(INLINE_VALUE_LIMIT);
        let inv = builder()
            .build(Path::new("a.jpg"), Operation::Set { field: &field, value: &value })
            .unwrap();
        assert!(inv.value_file().is_none());
    }

    #[test]
    fn limit_counts_bytes_not_chars() {
        let field = FieldResolver::default().resolve("Description", None);
        let value = "é".repeat(6); // 12 bytes
        let inv = builder()
            .with_inline_limit(10)
            .build(Path::new("a.jpg"), Operation::Set { field: &field, value: &value })
            .unwrap();
        assert!(inv.value_file().is_some());
    }

    #[test]
    fn value_file_removed_on_drop() {
        let field = FieldResolver::default().resolve("Description", None);
        let inv = builder()
            .with_inline_limit(1)
            .build(Path::new("a.jpg"), Operation::Set { field: &field, value: "long" })
            .unwrap();
        let temp = inv.value_file().unwrap().to_path_buf();
        drop(inv);
        assert!(!temp.exists());
    }

    // ── Delete / Strip / Wipe ────────────────────────────────────────

    #[test]
    fn delete_has_empty_value() {
        let field = FieldResolver::default().resolve("Copyright", Some(Category::Iptc));
        let inv = builder()
            .build(Path::new("a.jpg"), Operation::DeleteField { field: &field })
            .unwrap();
        assert_eq!(args(&inv)[5], "-IPTC:CopyrightNotice=");
    }

    #[test]
    fn strip_clears_privacy_tags() {
        let inv = builder().build(Path::new("a.jpg"), Operation::Strip).unwrap();
        let a = args(&inv);
        assert!(a.contains(&"-gps:all=".to_string()));
        assert!(a.contains(&"-iptc:by-line=".to_string()));
        assert_eq!(a.len(), WRITE_FLAGS.len() + STRIP_TAGS.len() + 1);
        assert_eq!(a.last().unwrap(), "a.jpg");
    }

    #[test]
    fn wipe_clears_all() {
        let inv = builder().build(Path::new("a.jpg"), Operation::WipeAll).unwrap();
        assert_eq!(args(&inv)[5], "-all=");
        assert!(Operation::WipeAll.is_mutating());
        assert!(!Operation::Read.is_mutating());
    }
}
