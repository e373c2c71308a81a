//! Language configuration for compilation, execution and timing

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use walkdir::WalkDir;

/// A command to hand to the shell, resolved when it is about to run
#[derive(Clone)]
pub enum CommandStep {
    /// Command text known up front
    Literal(String),
    /// Command text that depends on files produced by earlier steps
    Deferred(Arc<dyn Fn() -> anyhow::Result<String> + Send + Sync>),
}

impl CommandStep {
    pub fn resolve(&self) -> anyhow::Result<String> {
        match self {
            CommandStep::Literal(command) => Ok(command.clone()),
            CommandStep::Deferred(produce) => produce(),
        }
    }
}

impl fmt::Debug for CommandStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandStep::Literal(command) => f.debug_tuple("Literal").field(command).finish(),
            CommandStep::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Commands needed to build, run and time one solution
#[derive(Debug, Clone)]
pub struct Commands {
    /// Compile steps, run in order (empty for interpreted languages)
    pub compile: Vec<CommandStep>,
    pub execute: CommandStep,
    pub timing: CommandStep,
}

/// Configuration for a supported programming language
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// Canonical language name (e.g., "typescript")
    pub name: String,
    /// Source file extension without the dot (e.g., "ts")
    pub extension: String,
    /// Compile command templates
    pub compile: Vec<String>,
    /// Run command template
    pub run: String,
    /// Timing command template, may refer to the run command as `{run}`
    pub time: String,
    /// Whether solutions in this language support `--time`
    pub timing: bool,
}

impl LanguageConfig {
    /// Build the command bundle for a source file.
    ///
    /// `source` is relative to `root`, which is also the working directory
    /// commands run in.
    pub fn commands(&self, root: &Path, source: &Path) -> Commands {
        let vars = TemplateVars::new(source);
        let run = vars.apply(&self.run);
        let time = vars.apply(&self.time).replace("{run}", &run);

        Commands {
            compile: self
                .compile
                .iter()
                .map(|template| into_step(root, vars.apply(template)))
                .collect(),
            execute: into_step(root, run),
            timing: into_step(root, time),
        }
    }
}

/// Values substituted into command templates
struct TemplateVars {
    file: String,
    dir: String,
    stem: String,
    bin: String,
}

impl TemplateVars {
    fn new(source: &Path) -> Self {
        let file = source.to_string_lossy().to_string();
        let dir = source
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| ".".to_string());
        let stem = source.with_extension("").to_string_lossy().to_string();
        let bin = file.replace('.', "_");
        Self {
            file,
            dir,
            stem,
            bin,
        }
    }

    fn apply(&self, template: &str) -> String {
        template
            .replace("{file}", &self.file)
            .replace("{dir}", &self.dir)
            .replace("{stem}", &self.stem)
            .replace("{bin}", &self.bin)
    }
}

const FIND_PREFIX: &str = "{find:";
const CLASSES_PREFIX: &str = "{classes:";

fn into_step(root: &Path, command: String) -> CommandStep {
    if !command.contains(FIND_PREFIX) && !command.contains(CLASSES_PREFIX) {
        return CommandStep::Literal(command);
    }
    let root = root.to_path_buf();
    CommandStep::Deferred(Arc::new(move || expand_deferred(&root, &command)))
}

/// Expand `{find:DIR:EXT}` and `{classes:DIR}` against the current file tree
fn expand_deferred(root: &Path, command: &str) -> anyhow::Result<String> {
    let mut out = String::with_capacity(command.len());
    let mut rest = command;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find('}') else {
            out.push_str(tail);
            rest = "";
            break;
        };
        let placeholder = &tail[..=end];
        let expansion = if let Some(spec) = strip_placeholder(placeholder, FIND_PREFIX) {
            let (dir, ext) = spec
                .rsplit_once(':')
                .with_context(|| format!("Invalid placeholder {}", placeholder))?;
            find_files(root, dir, ext)?.join(" ")
        } else if let Some(dir) = strip_placeholder(placeholder, CLASSES_PREFIX) {
            jar_class_arguments(root, dir)?.join(" ")
        } else {
            placeholder.to_string()
        };
        out.push_str(&expansion);
        rest = &tail[end + 1..];
    }
    out.push_str(rest);

    Ok(out)
}

fn strip_placeholder<'a>(placeholder: &'a str, prefix: &str) -> Option<&'a str> {
    placeholder.strip_prefix(prefix)?.strip_suffix('}')
}

/// All files under `dir` (recursively) with the given extension, relative to `root`
fn find_files(root: &Path, dir: &str, ext: &str) -> anyhow::Result<Vec<String>> {
    let mut files: Vec<String> = WalkDir::new(root.join(dir))
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|e| e == ext))
        .map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .to_string()
        })
        .collect();

    if files.is_empty() {
        anyhow::bail!("No .{} files found under {}", ext, dir);
    }
    files.sort();
    Ok(files)
}

/// `-C <dir> <name>.class` arguments for every class file directly in `dir`
fn jar_class_arguments(root: &Path, dir: &str) -> anyhow::Result<Vec<String>> {
    let mut names: Vec<String> = WalkDir::new(root.join(dir))
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|e| e == "class"))
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();

    if names.is_empty() {
        anyhow::bail!("No class files generated under {}", dir);
    }
    names.sort();
    Ok(names
        .into_iter()
        .map(|name| format!("-C {} {}", dir, name))
        .collect())
}

/// Raw TOML configuration for a language
#[derive(Debug, Deserialize)]
struct RawLanguageConfig {
    extension: String,
    #[serde(default)]
    compile: Vec<String>,
    run: String,
    time: Option<String>,
    #[serde(default = "default_timing")]
    timing: bool,
    #[serde(default)]
    aliases: Vec<String>,
}

fn default_timing() -> bool {
    true
}

const BUILTIN_LANGUAGES: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/languages.toml"));

/// Immutable table of supported languages, built once at startup
#[derive(Debug, Clone, Default)]
pub struct LanguageTable {
    languages: BTreeMap<String, LanguageConfig>,
    /// Lowercased alias -> canonical name
    aliases: BTreeMap<String, String>,
}

impl LanguageTable {
    /// The language table shipped with the binary
    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_toml(BUILTIN_LANGUAGES)
    }

    /// Load a language table from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read language config {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Invalid language config {}", path.display()))
    }

    /// Load from `path` when given, otherwise use the builtin table
    pub fn load_or_builtin(path: Option<&PathBuf>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::builtin(),
        }
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let raw_configs: BTreeMap<String, RawLanguageConfig> = toml::from_str(content)?;

        let mut table = Self::default();
        for (name, raw) in raw_configs {
            let name = name.to_lowercase();
            if raw.run.trim().is_empty() {
                anyhow::bail!("Empty run command for {}", name);
            }
            let time = raw.time.unwrap_or_else(|| "{run} --time".to_string());

            for alias in raw.aliases {
                table.aliases.insert(alias.to_lowercase(), name.clone());
            }
            table.aliases.insert(name.clone(), name.clone());
            table.languages.insert(
                name.clone(),
                LanguageConfig {
                    name,
                    extension: raw.extension,
                    compile: raw.compile,
                    run: raw.run,
                    time,
                    timing: raw.timing,
                },
            );
        }

        Ok(table)
    }

    /// Get language configuration by name or alias
    pub fn get(&self, language: &str) -> Option<&LanguageConfig> {
        self.languages.get(self.canonical(language)?)
    }

    /// Canonical name for a language name or alias
    pub fn canonical(&self, language: &str) -> Option<&str> {
        self.aliases
            .get(&language.to_lowercase())
            .map(|name| name.as_str())
    }

    /// Whether a name or alias is known
    pub fn contains(&self, language: &str) -> bool {
        self.canonical(language).is_some()
    }

    /// Canonical names of all supported languages, sorted
    pub fn names(&self) -> Vec<String> {
        self.languages.keys().cloned().collect()
    }

    /// Width of the longest canonical language name
    pub fn name_width(&self) -> usize {
        self.languages
            .keys()
            .map(|name| name.chars().count())
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_table() -> LanguageTable {
        LanguageTable::from_toml(
            r#"
[c]
extension = "c"
compile = ["gcc -O3 -o {bin} {file}"]
run = "./{bin}"

[python]
extension = "py"
run = "python {file}"
aliases = ["py", "Python3"]

[lisp]
extension = "lisp"
run = "sbcl --script {file}"
timing = false

[typescript]
extension = "ts"
compile = ["yarn tsc {file}"]
run = "node lib/javascript/index.js ./{stem}"
time = "node lib/javascript/index.js ./{stem} --time"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_load_builtin_languages() {
        let table = LanguageTable::builtin().unwrap();

        for name in [
            "c",
            "golang",
            "java",
            "lisp",
            "python",
            "ruby",
            "rust",
            "scala",
            "typescript",
        ] {
            assert!(table.contains(name), "missing {}", name);
        }
        assert!(!table.get("golang").unwrap().timing);
        assert!(table.get("rust").unwrap().timing);
        assert_eq!(table.canonical("go"), Some("golang"));
        assert_eq!(table.name_width(), "typescript".len());
    }

    #[test]
    fn test_aliases_are_case_insensitive() {
        let table = test_table();

        assert_eq!(table.canonical("PY"), Some("python"));
        assert_eq!(table.canonical("python3"), Some("python"));
        assert_eq!(table.get("Python").unwrap().extension, "py");
        assert!(table.get("cobol").is_none());
        assert_eq!(table.names(), vec!["c", "lisp", "python", "typescript"]);
    }

    #[test]
    fn test_commands_substitute_paths() {
        let table = test_table();
        let source = Path::new("2000/02/main.c");
        let commands = table.get("c").unwrap().commands(Path::new("."), source);

        assert_eq!(commands.compile.len(), 1);
        assert_eq!(
            commands.compile[0].resolve().unwrap(),
            "gcc -O3 -o 2000/02/main_c 2000/02/main.c"
        );
        assert_eq!(commands.execute.resolve().unwrap(), "./2000/02/main_c");
        assert_eq!(commands.timing.resolve().unwrap(), "./2000/02/main_c --time");
    }

    #[test]
    fn test_interpreted_language_has_no_compile_steps() {
        let table = test_table();
        let config = table.get("python").unwrap();
        let commands = config.commands(Path::new("."), Path::new("2000/02/main.py"));

        assert_eq!(config.extension, "py");
        assert!(commands.compile.is_empty());
        assert_eq!(commands.execute.resolve().unwrap(), "python 2000/02/main.py");
    }

    #[test]
    fn test_custom_time_command_and_stem() {
        let table = test_table();
        let commands = table
            .get("typescript")
            .unwrap()
            .commands(Path::new("."), Path::new("2000/02/main.ts"));

        assert_eq!(
            commands.timing.resolve().unwrap(),
            "node lib/javascript/index.js ./2000/02/main --time"
        );
    }

    #[test]
    fn test_deferred_find_sees_files_created_later() {
        let root = tempfile::tempdir().unwrap();
        let step = into_step(root.path(), "javac {find:lib/java:java}".to_string());
        assert!(matches!(step, CommandStep::Deferred(_)));

        // Nothing to find yet
        assert!(step.resolve().is_err());

        fs::create_dir_all(root.path().join("lib/java/util")).unwrap();
        fs::write(root.path().join("lib/java/util/Grid.java"), "").unwrap();
        fs::write(root.path().join("lib/java/Input.java"), "").unwrap();
        fs::write(root.path().join("lib/java/README"), "").unwrap();

        assert_eq!(
            step.resolve().unwrap(),
            "javac lib/java/Input.java lib/java/util/Grid.java"
        );
    }

    #[test]
    fn test_deferred_classes_arguments() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("2000/02")).unwrap();
        fs::write(root.path().join("2000/02/Main.class"), "").unwrap();
        fs::write(root.path().join("2000/02/Main$1.class"), "").unwrap();

        let step = into_step(
            root.path(),
            "jar cfe 2000/02/main.jar Main {classes:2000/02}".to_string(),
        );

        assert_eq!(
            step.resolve().unwrap(),
            "jar cfe 2000/02/main.jar Main -C 2000/02 Main$1.class -C 2000/02 Main.class"
        );
    }

    #[test]
    fn test_reject_empty_run_command() {
        let result = LanguageTable::from_toml(
            r#"
[broken]
extension = "x"
run = "  "
"#,
        );
        assert!(result.is_err());
    }
}
