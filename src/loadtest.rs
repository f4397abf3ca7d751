//! Run load scenarios concurrently against a remote deployment and print
//! per-task metrics.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use sketches_ddsketch::DDSketch;
use yansi::Paint;

use crate::api::ApiRemote;
use crate::user::{Scenario, Session, Task, UserBehavior, perturb_age, perturb_vocabulary};

/// Runs the given scenarios concurrently against the remote.
///
/// Every scenario spawns its configured number of simulated users. Each user
/// bootstraps a session once, then loops until the deadline: wait a random
/// think time, select a weighted task, perform it, record the outcome.
/// Afterwards the per-scenario metrics and the merged totals are printed.
pub async fn run(remote: ApiRemote, scenarios: Vec<Scenario>, duration: Duration) -> Result<()> {
    let remote = Arc::new(remote);
    let deadline = tokio::time::Instant::now() + duration;

    let tasks: Vec<_> = scenarios
        .into_iter()
        .map(|scenario| {
            let remote = Arc::clone(&remote);
            tokio::spawn(run_scenario(remote, scenario, deadline))
        })
        .collect();

    let finished_tasks = futures::future::join_all(tasks).await;

    let mut total_metrics = ScenarioMetrics::default();
    for task in finished_tasks {
        let (scenario, metrics) = task?;

        println!();
        println!(
            "{} {} ({} users)",
            "## Scenario".bold(),
            scenario.name.bold().blue(),
            scenario.users.bold()
        );
        print_metrics(&metrics, duration);

        total_metrics.merge(&metrics);
    }

    println!();
    println!("{}", "## TOTALS".bold());
    print_metrics(&total_metrics, duration);

    Ok(())
}

async fn run_scenario(
    remote: Arc<ApiRemote>,
    scenario: Scenario,
    deadline: tokio::time::Instant,
) -> (Scenario, ScenarioMetrics) {
    let metrics = Arc::new(Mutex::new(ScenarioMetrics::default()));

    let users: Vec<_> = (0..scenario.users)
        .map(|index| {
            let remote = Arc::clone(&remote);
            let metrics = Arc::clone(&metrics);
            let behavior = scenario.behavior(index);
            tokio::spawn(run_user(remote, behavior, metrics, deadline))
        })
        .collect();
    futures::future::join_all(users).await;

    let metrics = {
        let mut metrics = metrics.lock().unwrap();
        std::mem::take(&mut *metrics)
    };

    (scenario, metrics)
}

async fn run_user(
    remote: Arc<ApiRemote>,
    mut behavior: UserBehavior,
    metrics: Arc<Mutex<ScenarioMetrics>>,
    deadline: tokio::time::Instant,
) {
    let role = behavior.pick_role();
    let session = Session::bootstrap(&remote, role).await;

    // See <https://docs.rs/tokio/latest/tokio/time/struct.Sleep.html#examples>
    let sleep = tokio::time::sleep_until(deadline);
    tokio::pin!(sleep);

    loop {
        let think_time = behavior.think_time();
        tokio::select! {
            _ = tokio::time::sleep(think_time) => {}
            _ = &mut sleep => break,
        }

        let task = behavior.next_task();
        if !task.eligible(&session) {
            metrics.lock().unwrap().record_skip(task);
            continue;
        }

        // A task in flight when the deadline hits is allowed to finish and
        // is still recorded.
        let start = Instant::now();
        match perform(&remote, &session, &mut behavior, task).await {
            Ok(()) => {
                metrics.lock().unwrap().record_success(task, start.elapsed());
            }
            Err(err) => {
                tracing::warn!(task = task.name(), "request failed: {err}");
                metrics.lock().unwrap().record_failure(task);
            }
        }

        if deadline.elapsed() > Duration::ZERO {
            break;
        }
    }
}

async fn perform(
    remote: &ApiRemote,
    session: &Session,
    behavior: &mut UserBehavior,
    task: Task,
) -> Result<()> {
    match task {
        Task::PublicTeachers => remote.public_teachers().await,
        Task::Homepage => remote.page("/").await,
        Task::TeamPage => remote.page("/team.html").await,
        Task::ProjectsPage => remote.page("/projects.html").await,
        Task::TechnicalPage => remote.page("/technical.html").await,
        Task::Profile => remote.profile(session.bearer()?).await.map(drop),
        Task::ListTeachers => remote.teachers(session.bearer()?).await,
        Task::UpdateTeacher => {
            let id = session.teacher_to_update();
            let teacher = remote.teacher(session.bearer()?, id).await?;
            let update = perturb_age(teacher, behavior.age_delta());
            remote.update_teacher(session.bearer()?, id, &update).await
        }
        Task::UpdateStudent => {
            let id = session
                .user_id
                .ok_or_else(|| anyhow::anyhow!("session has no user id"))?;
            let student = remote.student(session.bearer()?, id).await?;
            let update = perturb_vocabulary(student, behavior.vocabulary_delta());
            remote.update_student(session.bearer()?, id, &update).await
        }
        Task::LoginAttempt => {
            let credentials = behavior.login_credentials();
            remote
                .token(credentials.username, credentials.password)
                .await
                .map(drop)
        }
        Task::RegisterStudent => {
            let payload = behavior.student_payload();
            remote.create_student(session.bearer()?, &payload).await
        }
        Task::CreateTeacher => {
            let payload = behavior.teacher_payload();
            remote.create_teacher(session.bearer()?, &payload).await
        }
    }
}

#[derive(Default)]
struct TaskMetrics {
    timing: DDSketch,
    failures: u64,
    skipped: u64,
}

/// Per-task success timings and failure/skip counts for one scenario.
#[derive(Default)]
struct ScenarioMetrics {
    tasks: [TaskMetrics; Task::ALL.len()],
}

impl ScenarioMetrics {
    fn record_success(&mut self, task: Task, elapsed: Duration) {
        self.tasks[task as usize].timing.add(elapsed.as_secs_f64());
    }

    fn record_failure(&mut self, task: Task) {
        self.tasks[task as usize].failures += 1;
    }

    fn record_skip(&mut self, task: Task) {
        self.tasks[task as usize].skipped += 1;
    }

    fn merge(&mut self, other: &ScenarioMetrics) {
        for (into, from) in self.tasks.iter_mut().zip(&other.tasks) {
            into.timing.merge(&from.timing).unwrap();
            into.failures += from.failures;
            into.skipped += from.skipped;
        }
    }
}

fn print_metrics(metrics: &ScenarioMetrics, duration: Duration) {
    for (task, task_metrics) in Task::ALL.iter().zip(&metrics.tasks) {
        let ops = task_metrics.timing.count();
        if ops == 0 && task_metrics.failures == 0 && task_metrics.skipped == 0 {
            continue;
        }

        print!("{} ({} ops", task.name().bold().green(), ops.bold());
        if task_metrics.failures > 0 {
            print!(
                ", {}",
                format!("{} FAILURES", task_metrics.failures).bold().red()
            );
        }
        if task_metrics.skipped > 0 {
            print!(", {}", format!("{} skipped", task_metrics.skipped).dim());
        }
        println!(")");

        if ops > 0 {
            print_ops(&task_metrics.timing, duration);
            println!();
            print_percentiles(&task_metrics.timing, Duration::from_secs_f64);
        }
    }
}

fn print_percentiles<T: fmt::Debug>(sketch: &DDSketch, map: impl Fn(f64) -> T) {
    let ops = sketch.count();
    let avg = map(sketch.sum().unwrap() / ops as f64);
    let p50 = map(sketch.quantile(0.5).unwrap().unwrap());
    let p90 = map(sketch.quantile(0.9).unwrap().unwrap());
    let p99 = map(sketch.quantile(0.99).unwrap().unwrap());
    println!(
        "  avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}",
        avg.bold()
    );
}

fn print_ops(sketch: &DDSketch, duration: Duration) {
    let ops = sketch.count();
    let ops_ps = ops as f64 / duration.as_secs_f64();
    print!("  {:.2} operations/s", ops_ps.bold());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merging_metrics_accumulates_counts() {
        let mut first = ScenarioMetrics::default();
        first.record_success(Task::Homepage, Duration::from_millis(12));
        first.record_failure(Task::Homepage);
        first.record_skip(Task::CreateTeacher);

        let mut second = ScenarioMetrics::default();
        second.record_success(Task::Homepage, Duration::from_millis(20));
        second.record_skip(Task::CreateTeacher);

        first.merge(&second);

        let homepage = &first.tasks[Task::Homepage as usize];
        assert_eq!(homepage.timing.count(), 2);
        assert_eq!(homepage.failures, 1);
        assert_eq!(first.tasks[Task::CreateTeacher as usize].skipped, 2);
    }
}
