//! Line-driven test taking in a terminal.

use std::sync::Arc;
use std::time::Duration;

use exam_core::integrity::{EnvironmentEvent, Visibility};
use exam_core::model::{LearnerId, LessonId, Role};
use services::{
    AttemptError, AttemptLoopService, AttemptPhase, AttemptSession, AttemptView, Pending,
    Transition,
};
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
commands:
  start            begin the timed attempt
  <n>              choose option n for the current question
  next             go to the next question
  away / back      simulate leaving and returning to the test view
  exit             exit the test (needs confirm)
  retake           start another attempt (needs confirm)
  confirm/cancel   answer a pending confirmation
  save             retry storing the result
  status           show the current state
  quit             leave without finishing";

/// Run an interactive attempt until the learner quits or stdin closes.
///
/// # Errors
///
/// Returns an error if the attempt cannot be opened or stdin fails.
pub async fn take(
    service: Arc<AttemptLoopService>,
    learner_id: LearnerId,
    lesson_id: LessonId,
    role: Role,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = service.open(learner_id, lesson_id, role).await?;
    render(&service, &session);
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match service.tick(&mut session).await {
                    Ok(Transition::Finalized(_)) => {
                        println!("time is up");
                        render(&service, &session);
                    }
                    Ok(_) => {}
                    Err(err) => println!("error: {err}"),
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let command = line.trim();
                if command == "quit" {
                    break;
                }
                match handle(&service, &mut session, command).await {
                    Ok(()) => render(&service, &session),
                    Err(err) => println!("error: {err}"),
                }
            }
        }
    }

    service.teardown(&mut session);
    Ok(())
}

async fn handle(
    service: &AttemptLoopService,
    session: &mut AttemptSession,
    command: &str,
) -> Result<(), AttemptError> {
    let transition = match command {
        "" | "status" => Transition::Unchanged,
        "help" => {
            println!("{HELP}");
            Transition::Unchanged
        }
        "start" => service.confirm_start(session).await?,
        "next" => service.next(session).await?,
        "away" => {
            let event = EnvironmentEvent::Visibility(Visibility::Hidden);
            service.observe(session, &event).await?
        }
        "back" => {
            let event = EnvironmentEvent::Visibility(Visibility::Visible);
            service.observe(session, &event).await?
        }
        "exit" => {
            session.request_exit()?;
            println!("exit the test? the attempt will be invalidated (confirm/cancel)");
            Transition::Unchanged
        }
        "retake" => {
            session.request_retake()?;
            println!("start attempt {}? (confirm/cancel)", session.attempt_number() + 1);
            Transition::Unchanged
        }
        "confirm" => match session.pending() {
            Some(Pending::Exit) => service.confirm_exit(session).await?,
            Some(Pending::Retake) => service.confirm_retake(session).await?,
            None => return Err(AttemptError::ConfirmationMissing),
        },
        "cancel" => {
            session.cancel_exit();
            session.cancel_retake();
            Transition::Unchanged
        }
        "save" => {
            service.persist_result(session).await?;
            Transition::Unchanged
        }
        other => match other.parse::<usize>() {
            Ok(n) if n >= 1 => service.select_answer(session, n - 1).await?,
            _ => {
                println!("unknown command: {other} (type help)");
                Transition::Unchanged
            }
        },
    };

    if let Transition::Warned(warning) = transition {
        println!("warning: {}", warning.message());
        session.dismiss_warning();
    }
    Ok(())
}

fn render(service: &AttemptLoopService, session: &AttemptSession) {
    let view = AttemptView::of(session, service.clock().now());
    match view.phase {
        AttemptPhase::Preview => {
            println!("preview of {} questions", view.preview.len());
            for q in &view.preview {
                println!("{}. {}", q.position + 1, q.text);
                for (i, option) in q.options.iter().enumerate() {
                    let mark = if q.correct_answer_index == Some(i) { "*" } else { " " };
                    println!("  {mark}{}) {option}", i + 1);
                }
            }
        }
        AttemptPhase::NotStarted => {
            println!(
                "attempt {}/{}: {} questions, {} minutes, type start when ready",
                view.attempt_number,
                view.max_attempts,
                view.total_questions,
                service.config().duration_secs() / 60
            );
        }
        AttemptPhase::Running => {
            if let Some(q) = &view.question {
                println!(
                    "[{}] question {}/{} (switches left: {})",
                    view.remaining_label.as_deref().unwrap_or("--:--"),
                    q.position + 1,
                    view.total_questions,
                    view.remaining_switches
                );
                println!("{}", q.text);
                for (i, option) in q.options.iter().enumerate() {
                    let mark = if q.selected_index == Some(i) { ">" } else { " " };
                    println!("  {mark}{}) {option}", i + 1);
                }
            }
        }
        AttemptPhase::Finished { .. } | AttemptPhase::Invalidated(_) => {
            if let Some(attempt) = &view.latest {
                let outcome = match attempt.invalid_reason() {
                    Some(reason) => format!("invalidated ({reason})"),
                    None if attempt.passed() => "passed".to_string(),
                    None => "failed".to_string(),
                };
                println!(
                    "attempt {}/{}: {}/{} ({}%) {outcome}",
                    view.attempt_number,
                    view.max_attempts,
                    attempt.score(),
                    attempt.total(),
                    attempt.percentage()
                );
            }
            if !view.result_saved {
                println!("result not stored yet; type save to retry");
            }
            if view.can_retake {
                println!("type retake for another attempt");
            }
        }
    }
}
