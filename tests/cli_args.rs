// tests/cli_args.rs

use std::path::PathBuf;

use clap::Parser;

use runwatch::cli::{CliArgs, CliCommand};

#[test]
fn exec_takes_everything_after_the_separator() {
    let args = CliArgs::try_parse_from([
        "runwatch", "exec", "--env", "A=1", "--env", "B=x=y", "--timeout", "5", "--opaque",
        "--", "make", "-j", "4",
    ])
    .unwrap();

    match args.command {
        CliCommand::Exec {
            run,
            env,
            opaque,
            command,
        } => {
            assert_eq!(command, vec!["make", "-j", "4"]);
            assert_eq!(
                env,
                vec![
                    ("A".to_string(), "1".to_string()),
                    ("B".to_string(), "x=y".to_string())
                ]
            );
            assert!(opaque);
            assert_eq!(run.timeout, Some(5));
        }
        other => panic!("expected exec, got {other:?}"),
    }
}

#[test]
fn malformed_env_pair_is_rejected() {
    let result = CliArgs::try_parse_from(["runwatch", "exec", "--env", "=oops", "--", "true"]);
    assert!(result.is_err());
}

#[test]
fn script_and_global_flags() {
    let args = CliArgs::try_parse_from([
        "runwatch",
        "script",
        "main.py",
        "--cwd",
        "work",
        "--config",
        "other.toml",
    ])
    .unwrap();

    assert_eq!(args.config, Some(PathBuf::from("other.toml")));
    match args.command {
        CliCommand::Script { file, run } => {
            assert_eq!(file, PathBuf::from("main.py"));
            assert_eq!(run.cwd, Some(PathBuf::from("work")));
            assert_eq!(run.timeout, None);
        }
        other => panic!("expected script, got {other:?}"),
    }
}

#[test]
fn build_flags() {
    let args = CliArgs::try_parse_from(["runwatch", "build", "--dry-run", "--timeout", "60"]).unwrap();
    match args.command {
        CliCommand::Build {
            timeout,
            dry_run,
            install,
        } => {
            assert_eq!(timeout, Some(60));
            assert!(dry_run);
            assert!(!install);
        }
        other => panic!("expected build, got {other:?}"),
    }
}
