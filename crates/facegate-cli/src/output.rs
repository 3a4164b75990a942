use std::error::Error;
use std::io::{self, Write};

use facegate_core::faces::{AuthOutcome, RegistrationOutcome};
use serde::Serialize;
use serde_json::{json, Value};

use crate::cli::OutputMode;
use crate::doctor::{CheckStatus, DoctorOutcome};
use crate::engine::{AuthenticateReport, IdentitiesReport, RegisterReport, TokenReport};
use crate::errors::{AppError, AppResult};
use crate::keyring::{KeyringCheckSummary, KeyringInitSummary, KeyringOutcome};

fn write_json<T: Serialize + ?Sized>(payload: &T) -> AppResult<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let payload = serde_json::to_string(payload)?;
    handle.write_all(payload.as_bytes())?;
    handle.write_all(b"\n")?;
    Ok(())
}

pub fn render_register(report: &RegisterReport, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            for line in &report.logs {
                println!("{line}");
            }
            match &report.outcome {
                RegistrationOutcome::Created(record) => println!(
                    "Registration successful: {} ({} vector(s))",
                    record.name,
                    record.embedding_ids.len()
                ),
                RegistrationOutcome::AlreadyExists { name } => {
                    println!("Registration skipped: identity {name} already exists")
                }
            }
        }
        OutputMode::Json => write_json(&register_json_payload(report))?,
    }
    Ok(())
}

fn register_json_payload(report: &RegisterReport) -> Value {
    let mut payload = serde_json::to_value(&report.outcome).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut payload {
        map.insert(
            "store_dir".into(),
            Value::String(report.store_dir.display().to_string()),
        );
    }
    payload
}

pub fn render_authenticate(report: &AuthenticateReport, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            for line in &report.logs {
                println!("{line}");
            }
            match &report.outcome {
                AuthOutcome::Matched {
                    identity, token, ..
                } => {
                    println!("Authenticated as {identity}");
                    println!("{}", token.as_str());
                }
                AuthOutcome::NoMatch { .. } => println!("Authentication rejected: no match"),
                AuthOutcome::EmptyGallery => {
                    println!("Authentication rejected: no identities are enrolled")
                }
            }
        }
        OutputMode::Json => write_json(&authenticate_json_payload(report))?,
    }
    Ok(())
}

fn authenticate_json_payload(report: &AuthenticateReport) -> Value {
    match &report.outcome {
        AuthOutcome::Matched {
            identity,
            distance,
            token,
        } => json!({
            "status": "matched",
            "identity": identity,
            "distance": distance,
            "threshold": report.threshold,
            "token": token.as_str(),
            "expires_at": token.claims.exp,
        }),
        AuthOutcome::NoMatch {
            closest_identity,
            distance,
        } => json!({
            "status": "no_match",
            "closest_identity": closest_identity,
            "distance": distance,
            "threshold": report.threshold,
        }),
        AuthOutcome::EmptyGallery => json!({
            "status": "empty_gallery",
            "threshold": report.threshold,
        }),
    }
}

pub fn render_identities(report: &IdentitiesReport, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            if report.identities.is_empty() {
                println!(
                    "No identities enrolled in {}",
                    report.store_dir.display()
                );
            }
            for identity in &report.identities {
                let dimension = identity
                    .dimension
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{}\tvectors={}\tdimension={}\tcreated={}",
                    identity.name, identity.vector_count, dimension, identity.created_at
                );
            }
        }
        OutputMode::Json => write_json(&json!({
            "store_dir": report.store_dir.display().to_string(),
            "identities": report.identities,
        }))?,
    }
    Ok(())
}

pub fn render_token_verify(report: &TokenReport, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            let expires = report
                .claims
                .expires_at()
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| report.claims.exp.to_string());
            println!(
                "Token valid for {} (expires {expires})",
                report.claims.identity()
            );
        }
        OutputMode::Json => write_json(&json!({
            "status": "valid",
            "claims": report.claims,
        }))?,
    }
    Ok(())
}

pub fn render_error(err: &AppError, mode: OutputMode) {
    if let AppError::SecretServiceUnavailable {
        account,
        service,
        message,
    } = err
    {
        match mode {
            OutputMode::Human => {
                eprintln!(
                    "Secret Service unavailable for account '{account}' (service '{service}'): {message}"
                );
            }
            OutputMode::Json => {
                let payload = json!({
                    "success": false,
                    "account": account,
                    "service": service,
                    "error": message,
                });
                println!("{payload}");
            }
        }
        return;
    }

    match mode {
        OutputMode::Human => {
            eprintln!("error: {}", err.human_message());
            if let Some(source) = err.source() {
                eprintln!("cause: {source}");
            }
        }
        OutputMode::Json => {
            if let Ok(json) = serde_json::to_string(&error_json_payload(err)) {
                println!("{json}");
            }
            if let Some(source) = err.source() {
                eprintln!("cause: {source}");
            }
        }
    }
}

fn error_json_payload(err: &AppError) -> Value {
    json!({
        "success": false,
        "kind": format!("{:?}", err.kind()),
        "error": err.human_message(),
    })
}

pub fn render_keyring(outcome: &KeyringOutcome, mode: OutputMode) -> AppResult<()> {
    match outcome {
        KeyringOutcome::Check(summary) => render_keyring_check(summary, mode),
        KeyringOutcome::Init(summary) => render_keyring_init(summary, mode),
    }
}

pub fn render_keyring_check(summary: &KeyringCheckSummary, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            println!(
                "Secret Service available for account '{}' (service '{}')",
                summary.account, summary.service
            );
        }
        OutputMode::Json => write_json(&json!({
            "status": "ok",
            "account": summary.account,
            "service": summary.service,
        }))?,
    }
    Ok(())
}

pub fn render_keyring_init(summary: &KeyringInitSummary, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            for account in &summary.written {
                println!(
                    "Stored new key '{account}' in service '{}'",
                    summary.service
                );
            }
            for account in &summary.kept {
                println!("Kept existing key '{account}' (use --force to replace)");
            }
        }
        OutputMode::Json => write_json(summary)?,
    }
    Ok(())
}

pub fn render_doctor(outcome: &DoctorOutcome, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            for check in &outcome.checks {
                let label = match check.status {
                    CheckStatus::Pass => "PASS",
                    CheckStatus::Warn => "WARN",
                    CheckStatus::Fail => "FAIL",
                };
                println!("[{label}] {}: {}", check.name, check.message);
            }
            if outcome.ok {
                println!("All checks passed");
            } else {
                println!("One or more checks failed");
            }
        }
        OutputMode::Json => write_json(outcome)?,
    }
    Ok(())
}
