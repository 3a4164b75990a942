use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use facegate_cli::cli::OutputMode;
use facegate_cli::commands::{CommandHandler, DoctorHandler};
use facegate_cli::doctor::{CheckStatus, DoctorCheck, DoctorOutcome};
use facegate_cli::errors::AppError;

fn sample_outcome(status: CheckStatus) -> DoctorOutcome {
    DoctorOutcome {
        ok: status != CheckStatus::Fail,
        checks: vec![DoctorCheck {
            name: "check".into(),
            status,
            message: "msg".into(),
            path: None,
        }],
    }
}

#[test]
fn doctor_handler_uses_render_and_exit_code() {
    let renders = Arc::new(Mutex::new(0));
    let handler = DoctorHandler::with_dependencies(|| Ok(sample_outcome(CheckStatus::Fail)), {
        let renders = Arc::clone(&renders);
        move |_outcome, _mode| {
            *renders.lock().unwrap() += 1;
            Ok(())
        }
    });

    let code = handler.execute(OutputMode::Human, false).unwrap();
    assert_eq!(code, ExitCode::from(1));
    assert_eq!(*renders.lock().unwrap(), 1);
}

#[test]
fn doctor_handler_succeeds_with_warnings() {
    let handler = DoctorHandler::with_dependencies(
        || Ok(sample_outcome(CheckStatus::Warn)),
        |_outcome, _mode| Ok(()),
    );

    assert_eq!(
        handler.execute(OutputMode::Json, false).unwrap(),
        ExitCode::SUCCESS
    );
}

#[test]
fn doctor_handler_propagates_errors() {
    let handler = DoctorHandler::with_dependencies(
        || Err(AppError::InvalidConfig("boom".into())),
        |_outcome, _mode| Ok(()),
    );

    let err = handler.execute(OutputMode::Json, false).unwrap_err();
    match err {
        AppError::InvalidConfig(message) => assert_eq!(message, "boom"),
        other => panic!("unexpected error: {other}"),
    }
}
