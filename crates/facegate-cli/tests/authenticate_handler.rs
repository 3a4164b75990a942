use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use facegate_cli::cli::{AuthenticateArgs, EngineArgs, OutputMode};
use facegate_cli::commands::{AuthenticateHandler, CommandHandler};
use facegate_cli::engine::AuthenticateReport;
use facegate_cli::errors::AppError;
use facegate_core::faces::{AuthOutcome, SessionClaims, SessionToken};

fn sample_args() -> AuthenticateArgs {
    AuthenticateArgs {
        probe: PathBuf::from("probe.json"),
        threshold: Some(0.5),
        engine: EngineArgs::default(),
    }
}

fn report(outcome: AuthOutcome) -> AuthenticateReport {
    AuthenticateReport {
        outcome,
        threshold: 0.5,
        logs: vec![],
    }
}

#[test]
fn matched_probe_exits_successfully() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handler = AuthenticateHandler::with_dependencies(
        sample_args(),
        |_args| {
            Ok(report(AuthOutcome::Matched {
                identity: "alice".into(),
                distance: 0.01,
                token: SessionToken {
                    token: "h.c.s".into(),
                    claims: SessionClaims {
                        sub: "alice".into(),
                        iat: 0,
                        exp: 3600,
                        jti: "jti".into(),
                    },
                },
            }))
        },
        {
            let seen = Arc::clone(&seen);
            move |report, _mode| {
                seen.lock().unwrap().push(report.outcome.is_accepted());
                Ok(())
            }
        },
    );

    assert_eq!(
        handler.execute(OutputMode::Json, false).unwrap(),
        ExitCode::SUCCESS
    );
    assert_eq!(seen.lock().unwrap().as_slice(), &[true]);
}

#[test]
fn rejected_probe_is_rendered_and_exits_nonzero() {
    let renders = Arc::new(Mutex::new(0));
    let handler = AuthenticateHandler::with_dependencies(
        sample_args(),
        |_args| {
            Ok(report(AuthOutcome::NoMatch {
                closest_identity: "bob".into(),
                distance: 5.66,
            }))
        },
        {
            let renders = Arc::clone(&renders);
            move |_report, _mode| {
                *renders.lock().unwrap() += 1;
                Ok(())
            }
        },
    );

    assert_eq!(
        handler.execute(OutputMode::Human, false).unwrap(),
        ExitCode::from(4)
    );
    assert_eq!(*renders.lock().unwrap(), 1);
}

#[test]
fn empty_gallery_exits_nonzero() {
    let handler = AuthenticateHandler::with_dependencies(
        sample_args(),
        |_args| Ok(report(AuthOutcome::EmptyGallery)),
        |_report, _mode| Ok(()),
    );

    assert_eq!(
        handler.execute(OutputMode::Human, false).unwrap(),
        ExitCode::from(4)
    );
}

#[test]
fn dimension_mismatch_is_propagated() {
    let handler = AuthenticateHandler::with_dependencies(
        sample_args(),
        |_args| {
            Err(AppError::DimensionMismatch {
                identity: "alice".into(),
                expected: 3,
                found: 2,
            })
        },
        |_report, _mode| Ok(()),
    );

    let err = handler.execute(OutputMode::Json, false).unwrap_err();
    assert!(matches!(err, AppError::DimensionMismatch { expected: 3, found: 2, .. }));
}
