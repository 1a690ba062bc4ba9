use crate::error::{Result, UberError};
use crate::parfile::{ParFile, Section};
use crate::types::TargetType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MAIN_SECTION: &str = "main";

const RESERVED_KEYS: &[&str] = &["ofile"];

/// Accepted spellings of "enabled" for boolean parameter-file flags.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "on" | "true" | "yes"
    )
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Installation-wide settings, read from YAML. A missing file means defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Directory holding the processing programs. Falls back to `PATH`.
    #[serde(default)]
    pub bin_dir: Option<PathBuf>,
    /// Per-program executable overrides, keyed by program name.
    #[serde(default)]
    pub programs: BTreeMap<String, PathBuf>,
    #[serde(default = "default_max_file_age_days")]
    pub max_file_age_days: u64,
    /// Name of the hidden working directory created under the output directory.
    #[serde(default = "default_work_dir")]
    pub work_dir: String,
}

fn default_max_file_age_days() -> u64 {
    30
}

fn default_work_dir() -> String {
    ".uberproc".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bin_dir: None,
            programs: BTreeMap::new(),
            max_file_age_days: default_max_file_age_days(),
            work_dir: default_work_dir(),
        }
    }
}

impl Settings {
    pub const PATH_ENV: &'static str = "UBERPROC_CONFIG";
    pub const BIN_ENV: &'static str = "UBERPROC_BIN";

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&data)?;
        Ok(settings)
    }

    /// `$UBERPROC_CONFIG`, else `~/.config/uberproc/config.yaml`.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(p) = std::env::var_os(Self::PATH_ENV) {
            return Some(PathBuf::from(p));
        }
        home::home_dir().map(|h| h.join(".config").join("uberproc").join("config.yaml"))
    }

    /// Apply `$UBERPROC_BIN` on top of the file's `bin_dir`.
    pub fn with_env(mut self) -> Self {
        if let Some(dir) = std::env::var_os(Self::BIN_ENV) {
            self.bin_dir = Some(PathBuf::from(dir));
        }
        self
    }

    pub fn max_file_age(&self) -> Duration {
        Duration::from_secs(self.max_file_age_days * 24 * 60 * 60)
    }
}

// ---------------------------------------------------------------------------
// Command-line overrides
// ---------------------------------------------------------------------------

/// Flags given on the command line; each one can only switch a setting on.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub keepfiles: bool,
    pub overwrite: bool,
    pub use_existing: bool,
    pub tar: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// RunConfig
// ---------------------------------------------------------------------------

/// One requested target and its options.
#[derive(Debug, Clone, PartialEq)]
pub struct StepConfig {
    pub target: TargetType,
    /// Forwarded verbatim to the external program.
    pub options: BTreeMap<String, String>,
    pub keepfiles: bool,
    pub out_dir: Option<PathBuf>,
}

/// Everything a run needs, validated once and passed by reference.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub ifiles: Vec<PathBuf>,
    pub out_dir: PathBuf,
    pub steps: Vec<StepConfig>,
    pub keepfiles: bool,
    pub overwrite: bool,
    pub use_existing: bool,
    pub use_nrt_anc: bool,
    pub use_ancillary: bool,
    pub tar: Option<PathBuf>,
    pub settings: Settings,
}

impl RunConfig {
    pub fn from_par(par: &ParFile, overrides: &Overrides, settings: Settings) -> Result<Self> {
        let main = par
            .section(MAIN_SECTION)
            .ok_or_else(|| UberError::MissingSection(MAIN_SECTION.to_string()))?;

        let flag = |key: &str| main.get(key).map(is_truthy).unwrap_or(false);
        let keepfiles = overrides.keepfiles || flag("keepfiles");
        let overwrite = overrides.overwrite || flag("overwrite");
        let use_existing = overrides.use_existing || flag("use_existing");
        if overwrite && use_existing {
            return Err(UberError::ConflictingOptions(
                "overwrite and use_existing cannot both be set".to_string(),
            ));
        }

        let use_nrt_anc = match main.get("use_nrt_anc") {
            None => false,
            Some("0") => false,
            Some("1") => true,
            Some(other) => {
                return Err(UberError::InvalidConfig(format!(
                    "use_nrt_anc must be 0 or 1, found '{other}'"
                )))
            }
        };

        let ifiles = input_files(main)?;
        let out_dir = main
            .get("odir")
            .filter(|d| !d.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        for (key, _) in &main.entries {
            if !MAIN_KEYS.contains(&key.as_str()) {
                tracing::warn!(key = %key, "ignoring unknown key in [main]");
            }
        }

        let steps = par
            .sections
            .iter()
            .filter(|s| !s.name.eq_ignore_ascii_case(MAIN_SECTION))
            .map(step_config)
            .collect::<Result<Vec<_>>>()?;
        if steps.is_empty() {
            return Err(UberError::NoTargets);
        }

        Ok(Self {
            ifiles,
            out_dir,
            steps,
            keepfiles,
            overwrite,
            use_existing,
            use_nrt_anc,
            use_ancillary: flag("use_ancillary"),
            tar: overrides.tar.clone(),
            settings,
        })
    }

    /// Hidden working directory for generated parameter and list files.
    pub fn work_dir(&self) -> PathBuf {
        self.out_dir.join(&self.settings.work_dir)
    }
}

const MAIN_KEYS: &[&str] = &[
    "ifile",
    "infilelist",
    "odir",
    "keepfiles",
    "overwrite",
    "use_existing",
    "use_nrt_anc",
    "use_ancillary",
];

fn input_files(main: &Section) -> Result<Vec<PathBuf>> {
    let files: Vec<PathBuf> = match (main.get("ifile"), main.get("infilelist")) {
        (Some(_), Some(_)) => {
            return Err(UberError::ConflictingOptions(
                "give either ifile or infilelist, not both".to_string(),
            ))
        }
        (Some(list), None) => split_list(list).map(PathBuf::from).collect(),
        (None, Some(list_file)) => read_file_list(Path::new(list_file))?,
        (None, None) => Vec::new(),
    };
    if files.is_empty() {
        return Err(UberError::InvalidConfig(
            "[main] must name input files with ifile or infilelist".to_string(),
        ));
    }
    Ok(files)
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
}

/// One path per line; blank lines and `#` comments are skipped.
pub fn read_file_list(path: &Path) -> Result<Vec<PathBuf>> {
    let text = std::fs::read_to_string(path).map_err(|e| UberError::FileList {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(PathBuf::from)
        .collect())
}

fn step_config(section: &Section) -> Result<StepConfig> {
    let target: TargetType = section.name.parse()?;
    let mut options = BTreeMap::new();
    let mut keepfiles = false;
    let mut out_dir = None;

    for (key, value) in &section.entries {
        let lowered = key.to_lowercase();
        if RESERVED_KEYS.contains(&lowered.as_str()) {
            return Err(UberError::ReservedKey {
                section: section.name.clone(),
                key: key.clone(),
            });
        }
        // keepfiles and odir steer the orchestrator, not the program.
        match lowered.as_str() {
            "keepfiles" => keepfiles = is_truthy(value),
            "odir" => out_dir = Some(PathBuf::from(value)),
            _ => {
                options.insert(key.clone(), value.clone());
            }
        }
    }

    Ok(StepConfig {
        target,
        options,
        keepfiles,
        out_dir,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(text: &str, overrides: &Overrides) -> Result<RunConfig> {
        RunConfig::from_par(&ParFile::parse(text).unwrap(), overrides, Settings::default())
    }

    #[test]
    fn truthy_tokens() {
        for v in ["1", "ON", "on", "True", "yes", "YES"] {
            assert!(is_truthy(v), "{v}");
        }
        for v in ["0", "off", "no", "", "2"] {
            assert!(!is_truthy(v), "{v}");
        }
    }

    #[test]
    fn builds_steps_from_sections() {
        let cfg = parse(
            "[main]\nifile=a.L0,b.L0 c.L0\nodir=out\n[l2gen]\nl2prod=chlor_a\nkeepfiles=yes\n[l2bin]\n",
            &Overrides::default(),
        )
        .unwrap();
        assert_eq!(cfg.ifiles.len(), 3);
        assert_eq!(cfg.out_dir, PathBuf::from("out"));
        assert_eq!(cfg.steps.len(), 2);
        assert_eq!(cfg.steps[0].target, TargetType::L2Gen);
        assert!(cfg.steps[0].keepfiles);
        assert_eq!(cfg.steps[0].options.get("l2prod").map(String::as_str), Some("chlor_a"));
        assert!(!cfg.steps[0].options.contains_key("keepfiles"));
        assert_eq!(cfg.work_dir(), PathBuf::from("out/.uberproc"));
    }

    #[test]
    fn overwrite_and_use_existing_conflict() {
        let err = parse("[main]\nifile=a\noverwrite=1\nuse_existing=on\n[l2gen]\n", &Overrides::default())
            .unwrap_err();
        assert!(matches!(err, UberError::ConflictingOptions(_)));

        let overrides = Overrides {
            overwrite: true,
            ..Default::default()
        };
        let err = parse("[main]\nifile=a\nuse_existing=TRUE\n[l2gen]\n", &overrides).unwrap_err();
        assert!(matches!(err, UberError::ConflictingOptions(_)));
    }

    #[test]
    fn ofile_is_reserved() {
        let err = parse("[main]\nifile=a\n[l2gen]\nofile=x.L2\n", &Overrides::default()).unwrap_err();
        assert!(matches!(err, UberError::ReservedKey { .. }));
    }

    #[test]
    fn unknown_section_is_rejected() {
        let err = parse("[main]\nifile=a\n[l4gen]\n", &Overrides::default()).unwrap_err();
        assert!(matches!(err, UberError::UnknownTarget(_)));
    }

    #[test]
    fn main_section_is_required() {
        let err = parse("[l2gen]\n", &Overrides::default()).unwrap_err();
        assert!(matches!(err, UberError::MissingSection(_)));
    }

    #[test]
    fn targets_are_required() {
        let err = parse("[main]\nifile=a\n", &Overrides::default()).unwrap_err();
        assert!(matches!(err, UberError::NoTargets));
    }

    #[test]
    fn use_nrt_anc_must_be_binary() {
        let cfg = parse("[main]\nifile=a\nuse_nrt_anc=1\n[l2gen]\n", &Overrides::default()).unwrap();
        assert!(cfg.use_nrt_anc);
        let err = parse("[main]\nifile=a\nuse_nrt_anc=yes\n[l2gen]\n", &Overrides::default()).unwrap_err();
        assert!(matches!(err, UberError::InvalidConfig(_)));
    }

    #[test]
    fn infilelist_is_read() {
        let dir = TempDir::new().unwrap();
        let list = dir.path().join("inputs.txt");
        std::fs::write(&list, "# granules\nA2010001000000.L2_LAC\n\nA2010001000500.L2_LAC\n").unwrap();
        let text = format!("[main]\ninfilelist={}\n[l2bin]\n", list.display());
        let cfg = parse(&text, &Overrides::default()).unwrap();
        assert_eq!(cfg.ifiles.len(), 2);
    }

    #[test]
    fn unreadable_infilelist_is_reported() {
        let err = parse("[main]\ninfilelist=/nonexistent/list.txt\n[l2bin]\n", &Overrides::default())
            .unwrap_err();
        assert!(matches!(err, UberError::FileList { .. }));
    }

    #[test]
    fn cli_flags_switch_settings_on() {
        let overrides = Overrides {
            keepfiles: true,
            use_existing: true,
            tar: Some(PathBuf::from("out.tar")),
            ..Default::default()
        };
        let cfg = parse("[main]\nifile=a\n[l2gen]\n", &overrides).unwrap();
        assert!(cfg.keepfiles);
        assert!(cfg.use_existing);
        assert!(!cfg.overwrite);
        assert_eq!(cfg.tar, Some(PathBuf::from("out.tar")));
    }

    #[test]
    fn settings_defaults_when_missing() {
        let dir = TempDir::new().unwrap();
        let s = Settings::load(&dir.path().join("config.yaml")).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.max_file_age(), Duration::from_secs(30 * 86_400));
    }

    #[test]
    fn settings_load_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "bin_dir: /opt/ocssw/bin\nmax_file_age_days: 7\nprograms:\n  l2gen: /usr/local/bin/l2gen_test\n",
        )
        .unwrap();
        let s = Settings::load(&path).unwrap();
        assert_eq!(s.bin_dir, Some(PathBuf::from("/opt/ocssw/bin")));
        assert_eq!(s.max_file_age_days, 7);
        assert_eq!(s.work_dir, ".uberproc");
        assert!(s.programs.contains_key("l2gen"));
    }

    #[test]
    fn settings_reject_typos() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "max_file_age: 7\n").unwrap();
        assert!(matches!(Settings::load(&path), Err(UberError::Yaml(_))));
    }
}
