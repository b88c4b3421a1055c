//! Command-line parsing against the option table
//!
//! The clap `Command` is rebuilt from the table on every parse because
//! modules add options after the first (lenient) pass.

use super::{CommandLine, ConfigValue, HelpTopic, OptionKind, OptionSpec, ParseMode, MAIN_MODULE};
use crate::{Error, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::collections::BTreeMap;
use std::ffi::OsString;
use tracing::debug;

const TARGETS_ID: &str = "targets";

fn negated(name: &str) -> String {
    format!("no-{}", name)
}

fn build_command(program: &str, version: &str, specs: &[&OptionSpec], mode: ParseMode) -> Command {
    let mut cmd = Command::new(program.to_string())
        .version(version.to_string())
        .disable_help_flag(true)
        .disable_version_flag(true)
        .ignore_errors(mode == ParseMode::Lenient)
        .arg(
            Arg::new(TARGETS_ID)
                .num_args(0..)
                .action(ArgAction::Append)
                .value_parser(value_parser!(OsString))
                .value_name("TARGET")
                .help("Media references, each optionally followed by :option tokens"),
        );

    for spec in specs {
        cmd = add_option(cmd, spec);
    }

    cmd
}

fn add_option(cmd: Command, spec: &OptionSpec) -> Command {
    let mut arg = Arg::new(spec.name.clone())
        .long(spec.name.clone())
        .help(spec.help.clone());

    if let Some(c) = spec.short {
        arg = arg.short(c);
    }
    if spec.module != MAIN_MODULE {
        arg = arg.help_heading(spec.module.clone());
    }

    match spec.kind {
        OptionKind::Bool => {
            let no = negated(&spec.name);
            let arg = arg.action(ArgAction::SetTrue).overrides_with(no.clone());
            let negative = Arg::new(no.clone())
                .long(no)
                .action(ArgAction::SetTrue)
                .overrides_with(spec.name.clone())
                .hide(true);
            cmd.arg(arg).arg(negative)
        }
        OptionKind::Int => cmd.arg(
            arg.action(ArgAction::Set)
                .value_name("N")
                .value_parser(value_parser!(i64)),
        ),
        OptionKind::Str => cmd.arg(arg.action(ArgAction::Set).value_name("VALUE")),
        OptionKind::Count => cmd.arg(arg.action(ArgAction::Count)),
    }
}

fn collect_overrides(matches: &ArgMatches, specs: &[&OptionSpec]) -> BTreeMap<String, ConfigValue> {
    let mut overrides = BTreeMap::new();

    for spec in specs {
        let value = match spec.kind {
            OptionKind::Bool => {
                let no = negated(&spec.name);
                if matches.get_flag(&no) {
                    Some(ConfigValue::Bool(false))
                } else if matches.get_flag(&spec.name) {
                    Some(ConfigValue::Bool(true))
                } else {
                    None
                }
            }
            OptionKind::Int => matches
                .try_get_one::<i64>(&spec.name)
                .ok()
                .flatten()
                .map(|v| ConfigValue::Int(*v)),
            OptionKind::Str => matches
                .try_get_one::<String>(&spec.name)
                .ok()
                .flatten()
                .map(|v| ConfigValue::Str(v.clone())),
            OptionKind::Count => match matches.get_count(&spec.name) {
                0 => None,
                n => Some(ConfigValue::Int(i64::from(n))),
            },
        };

        if let Some(value) = value {
            overrides.insert(spec.name.clone(), value);
        }
    }

    overrides
}

/// Parse `argv` against `specs`
pub(super) fn parse(
    program: &str,
    version: &str,
    specs: &[&OptionSpec],
    argv: &[OsString],
    mode: ParseMode,
) -> Result<CommandLine> {
    let cmd = build_command(program, version, specs, mode);

    let matches = match cmd.try_get_matches_from(argv) {
        Ok(matches) => matches,
        Err(e) if mode == ParseMode::Lenient => {
            debug!("Ignoring command line error during lenient parse: {}", e);
            return Ok(CommandLine::default());
        }
        Err(e) => return Err(Error::CommandLine(e.render().to_string())),
    };

    let targets = matches
        .get_many::<OsString>(TARGETS_ID)
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    Ok(CommandLine {
        overrides: collect_overrides(&matches, specs),
        targets,
    })
}

/// Render help text for `topic`
pub(super) fn render_help(
    program: &str,
    version: &str,
    specs: &[&OptionSpec],
    topic: &HelpTopic,
) -> String {
    let selected: Vec<&OptionSpec> = specs
        .iter()
        .copied()
        .filter(|spec| match topic {
            HelpTopic::Short => spec.module == MAIN_MODULE,
            HelpTopic::Long => true,
            HelpTopic::Module(name) => &spec.module == name,
        })
        .collect();

    if let HelpTopic::Module(name) = topic {
        if selected.is_empty() {
            return format!("Module '{}' has no configurable options\n", name);
        }
    }

    let mut cmd = build_command(program, version, &selected, ParseMode::Strict);
    match topic {
        HelpTopic::Short => cmd.render_help().to_string(),
        _ => cmd.render_long_help().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::core_options;

    fn argv(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    fn parse_core(args: &[&str], mode: ParseMode) -> Result<CommandLine> {
        let options = core_options();
        let specs: Vec<&OptionSpec> = options.iter().collect();
        parse("medley", "0.1.0", &specs, &argv(args), mode)
    }

    #[test]
    fn test_negated_flag_wins_when_last() {
        let cl = parse_core(&["medley", "--sse", "--no-sse"], ParseMode::Strict).unwrap();
        assert_eq!(cl.overrides.get("sse"), Some(&ConfigValue::Bool(false)));
    }

    #[test]
    fn test_positive_flag_wins_when_last() {
        let cl = parse_core(&["medley", "--no-color", "--color"], ParseMode::Strict).unwrap();
        assert_eq!(cl.overrides.get("color"), Some(&ConfigValue::Bool(true)));
    }

    #[test]
    fn test_verbose_counts() {
        let cl = parse_core(&["medley", "-vv"], ParseMode::Strict).unwrap();
        assert_eq!(cl.overrides.get("verbose"), Some(&ConfigValue::Int(2)));
    }

    #[test]
    fn test_targets_keep_order_and_markers() {
        let cl = parse_core(
            &["medley", "--stats", "movie.avi", ":sub1", ":sub2", "other.mp4"],
            ParseMode::Strict,
        )
        .unwrap();
        assert_eq!(cl.targets, argv(&["movie.avi", ":sub1", ":sub2", "other.mp4"]));
        assert_eq!(cl.overrides.get("stats"), Some(&ConfigValue::Bool(true)));
    }

    #[test]
    fn test_unknown_option_strict_fails() {
        let result = parse_core(&["medley", "--no-such-option"], ParseMode::Strict);
        assert!(matches!(result, Err(Error::CommandLine(_))));
    }

    #[test]
    fn test_string_option_value() {
        let cl = parse_core(&["medley", "--extraintf", "http:rc"], ParseMode::Strict).unwrap();
        assert_eq!(
            cl.overrides.get("extraintf"),
            Some(&ConfigValue::Str("http:rc".to_string()))
        );
    }
}
