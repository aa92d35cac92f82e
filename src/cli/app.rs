//! Main CLI application

use crate::actions::ActionRegistry;
use crate::config::{self, load_env_file, parse_config_auto, validate_config, Config};
use crate::error::{BriskError, ConfigError};
use crate::runner::{
    BuildContext, NotifySource, Scheduler, TaskRef, TaskRegistry, WatchController, WatchRule,
};
use crate::ui::Verbosity;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use clap_complete::Shell;
use std::io;
use std::path::PathBuf;

/// CLI application
pub struct App {
    /// The clap command
    command: Command,
    /// Parsed configuration
    config: Config,
    /// Config file path
    config_path: PathBuf,
    /// Tasks built from the configuration
    registry: TaskRegistry,
}

impl App {
    /// Create a new app from configuration file
    pub fn new() -> Result<Self, BriskError> {
        let (config, config_path) = parse_config_auto()?;
        Self::from_config(config, config_path)
    }

    /// Create app with a specific config file
    pub fn with_config_file(path: PathBuf) -> Result<Self, BriskError> {
        let config = config::load_layered(&path)?;
        Self::from_config(config, path)
    }

    fn from_config(config: Config, config_path: PathBuf) -> Result<Self, BriskError> {
        let registry = validate_config(&config)?;
        let command = build_command(&config, &registry);

        Ok(App {
            command,
            config,
            config_path,
            registry,
        })
    }

    /// App without a project, enough to print completions
    fn bare() -> Self {
        let config = Config::default();
        let registry = TaskRegistry::new();
        App {
            command: build_command(&config, &registry),
            config,
            config_path: PathBuf::from("brisk.yml"),
            registry,
        }
    }

    /// Run the application with command line arguments
    pub fn run(self) -> Result<(), BriskError> {
        let matches = self.command.clone().get_matches();
        self.run_matches(&matches)
    }

    fn run_matches(mut self, matches: &ArgMatches) -> Result<(), BriskError> {
        let verbosity = get_verbosity(matches);

        if let Some(shell) = matches.get_one::<Shell>("completions") {
            clap_complete::generate(*shell, &mut self.command, "brisk", &mut io::stdout());
            return Ok(());
        }

        if matches.get_flag("list") {
            print!("{}", format_task_list(&self.registry));
            return Ok(());
        }

        let tasks: Vec<TaskRef> = matches
            .get_many::<String>("tasks")
            .map(|values| values.map(|t| TaskRef::parse(t)).collect())
            .unwrap_or_default();
        let watch: Option<Vec<String>> = matches
            .contains_id("watch")
            .then(|| {
                matches
                    .get_many::<String>("watch")
                    .map(|values| values.cloned().collect())
                    .unwrap_or_default()
            });

        if tasks.is_empty() && watch.is_none() {
            // No task specified, show help
            self.command.print_help()?;
            println!();
            return Ok(());
        }

        let mut ctx = BuildContext::from_config(&self.config, &self.config_path)?;
        load_env_file(&ctx.project_dir);
        ctx = ctx.with_verbosity(verbosity);

        let actions = ActionRegistry::with_builtins();
        let scheduler = Scheduler::new(&self.registry, &actions);

        if !tasks.is_empty() {
            let summary = scheduler.run_all(&mut ctx, &tasks)?;
            let mut line = format!("Done: {} step(s)", summary.executed);
            if summary.inserted > 0 {
                line.push_str(&format!(", {} setup step(s)", summary.inserted));
            }
            if summary.lenient_failures > 0 {
                line.push_str(&format!(", {} tolerated failure(s)", summary.lenient_failures));
            }
            ctx.reporter.info(&line);
        }

        if let Some(names) = watch {
            let rules = WatchRule::from_config(&self.config, &names)?;
            if rules.is_empty() {
                return Err(ConfigError::Invalid("no watch rules are defined".to_string()).into());
            }
            let mut source = NotifySource::new(&ctx.project_dir)?;
            let mut controller = WatchController::new(scheduler, rules);
            let stats = controller.watch(&mut ctx, &mut source);
            log::debug!("watch ended after {} run(s), {} failed", stats.runs, stats.failures);
        }

        Ok(())
    }
}

/// Build the clap command from configuration
fn build_command(config: &Config, registry: &TaskRegistry) -> Command {
    let about = config
        .usage
        .clone()
        .or_else(|| config.name.clone())
        .unwrap_or_else(|| "A YAML-driven build orchestration runner".to_string());

    Command::new("brisk")
        .version(env!("CARGO_PKG_VERSION"))
        .about(about)
        .after_help(format_task_list(registry))
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .help("Path to brisk.yml config file"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only print command output and errors")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("silent")
                .short('s')
                .long("silent")
                .help("Print no output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print verbose output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("list")
                .short('l')
                .long("list")
                .help("List available tasks and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("watch")
                .short('w')
                .long("watch")
                .value_name("RULE")
                .num_args(0..)
                .help("Watch for changes after running TASKs (all rules when none are named)"),
        )
        .arg(
            Arg::new("completions")
                .long("completions")
                .value_name("SHELL")
                .value_parser(value_parser!(Shell))
                .help("Print a shell completion script"),
        )
        .arg(
            Arg::new("tasks")
                .value_name("TASK[:VARIANT]")
                .num_args(1..)
                .help("Tasks to run, in order"),
        )
}

/// Public tasks with their usage and variants
pub fn format_task_list(registry: &TaskRegistry) -> String {
    let public: Vec<(&str, String)> = registry
        .tasks()
        .filter(|(_, info)| !info.private)
        .map(|(name, info)| {
            let mut text = info.usage.clone().unwrap_or_default();
            let variants = registry.variants(name);
            if !variants.is_empty() {
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(&format!("[variants: {}]", variants.join(", ")));
            }
            (name, text)
        })
        .collect();

    if public.is_empty() {
        return String::new();
    }

    let width = public.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    let mut out = String::from("Tasks:\n");
    for (name, text) in public {
        out.push_str(format!("  {:width$}  {}", name, text, width = width).trim_end());
        out.push('\n');
    }
    out
}

/// Get verbosity level from matches
fn get_verbosity(matches: &ArgMatches) -> Verbosity {
    if matches.get_flag("silent") {
        Verbosity::Silent
    } else if matches.get_flag("quiet") {
        Verbosity::Quiet
    } else if matches.get_flag("verbose") {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}

/// Run the CLI application with provided arguments
pub fn run() -> Result<(), BriskError> {
    // Check if --file flag is provided first
    let args: Vec<String> = std::env::args().collect();
    let file_path = extract_file_arg(&args);

    let app = match file_path {
        Some(path) => App::with_config_file(path)?,
        None => match App::new() {
            Ok(app) => app,
            Err(BriskError::Config(ConfigError::NotFound(_)))
                if args.iter().any(|a| a == "--completions") =>
            {
                App::bare()
            }
            Err(e) => return Err(e),
        },
    };

    app.run()
}

/// Default log filter for the binary, decided before clap parsing so the
/// logger can be initialised first. `RUST_LOG` still takes precedence.
pub fn default_log_filter(args: &[String]) -> &'static str {
    let has = |short: &str, long: &str| args.iter().skip(1).any(|a| a == short || a == long);
    if has("-v", "--verbose") && !has("-s", "--silent") {
        "debug"
    } else {
        "warn"
    }
}

/// Extract --file argument before clap parsing
fn extract_file_arg(args: &[String]) -> Option<PathBuf> {
    for i in 0..args.len() {
        if (args[i] == "--file" || args[i] == "-f") && i + 1 < args.len() {
            return Some(PathBuf::from(&args[i + 1]));
        }
        if let Some(path) = args[i].strip_prefix("--file=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::Step;

    #[test]
    fn test_get_verbosity_normal() {
        let cmd = Command::new("test")
            .arg(Arg::new("quiet").long("quiet").action(ArgAction::SetTrue))
            .arg(Arg::new("silent").long("silent").action(ArgAction::SetTrue))
            .arg(Arg::new("verbose").long("verbose").action(ArgAction::SetTrue));
        let matches = cmd.get_matches_from(vec!["test"]);
        assert_eq!(get_verbosity(&matches), Verbosity::Normal);
    }

    #[test]
    fn test_silent_wins() {
        let registry = TaskRegistry::new();
        let cmd = build_command(&Config::default(), &registry);
        let matches = cmd.get_matches_from(vec!["brisk", "-s", "-v"]);
        assert_eq!(get_verbosity(&matches), Verbosity::Silent);
    }

    #[test]
    fn test_extract_file_arg() {
        let args = vec![
            "brisk".to_string(),
            "--file".to_string(),
            "test.yml".to_string(),
        ];
        let path = extract_file_arg(&args);
        assert_eq!(path, Some(PathBuf::from("test.yml")));
    }

    #[test]
    fn test_extract_file_arg_short() {
        let args = vec!["brisk".to_string(), "-f".to_string(), "test.yml".to_string()];
        let path = extract_file_arg(&args);
        assert_eq!(path, Some(PathBuf::from("test.yml")));
    }

    #[test]
    fn test_default_log_filter() {
        let args = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(default_log_filter(&args(&["brisk", "build"])), "warn");
        assert_eq!(default_log_filter(&args(&["brisk", "-v", "build"])), "debug");
        assert_eq!(default_log_filter(&args(&["brisk", "--verbose", "build"])), "debug");
        assert_eq!(default_log_filter(&args(&["brisk", "-v", "-s", "build"])), "warn");
    }

    #[test]
    fn test_extract_file_arg_equals() {
        let args = vec!["brisk".to_string(), "--file=ci.yml".to_string()];
        assert_eq!(extract_file_arg(&args), Some(PathBuf::from("ci.yml")));
    }

    #[test]
    fn test_tasks_and_watch_rules_parse() {
        let registry = TaskRegistry::new();
        let cmd = build_command(&Config::default(), &registry);
        let matches =
            cmd.get_matches_from(vec!["brisk", "setup:dev-cli", "ts:dev-cli", "--watch", "ts-source"]);

        let tasks: Vec<&String> = matches.get_many::<String>("tasks").unwrap().collect();
        assert_eq!(tasks, vec!["setup:dev-cli", "ts:dev-cli"]);
        let rules: Vec<&String> = matches.get_many::<String>("watch").unwrap().collect();
        assert_eq!(rules, vec!["ts-source"]);
    }

    #[test]
    fn test_format_task_list_hides_private_tasks() {
        let mut registry = TaskRegistry::new();
        registry.register("dev-cli", None, vec![Step::action("exec")]);
        registry.register("delete-jh-tar", None, vec![Step::action("delete")]);
        registry.register("launcher", Some("doppio"), vec![Step::action("launcher")]);
        registry.register("launcher", Some("doppioh"), vec![Step::action("launcher")]);
        registry.describe(
            "dev-cli",
            crate::runner::TaskInfo {
                usage: Some("Builds the command line interface".to_string()),
                ..Default::default()
            },
        );
        registry.describe(
            "delete-jh-tar",
            crate::runner::TaskInfo {
                private: true,
                ..Default::default()
            },
        );

        let listing = format_task_list(&registry);
        assert!(listing.contains("dev-cli"));
        assert!(listing.contains("Builds the command line interface"));
        assert!(listing.contains("[variants: doppio, doppioh]"));
        assert!(!listing.contains("delete-jh-tar"));
    }
}
