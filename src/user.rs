//! A module for defining the behavior of one simulated user.
//!
//! A [`Scenario`] describes a population of simulated users sharing the same
//! behavior: the think-time bounds, the probability of logging in as a
//! manager, and the relative weights of the task catalog. Each user gets its
//! own [`UserBehavior`], which owns the RNG driving task selection, pacing
//! and payload synthesis, and a [`Session`] holding its authentication state.

use std::time::Duration;

use anyhow::{Context, Result};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::Distribution;
use rand_distr::weighted::WeightedIndex;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::{ApiRemote, Student, StudentPayload, Teacher, TeacherPayload};

/// A username/password pair accepted by the token endpoint.
#[derive(Debug, Clone, Copy)]
pub struct Credentials {
    /// The login email.
    pub username: &'static str,
    /// The password.
    pub password: &'static str,
}

const MANAGER_CREDENTIALS: Credentials = Credentials {
    username: "admin@example.com",
    password: "admin123",
};

const REGULAR_CREDENTIALS: Credentials = Credentials {
    username: "alice@example.com",
    password: "password123",
};

/// Credential pairs cycled through by the login-attempt task.
const KNOWN_LOGINS: &[Credentials] = &[
    REGULAR_CREDENTIALS,
    Credentials {
        username: "bob@example.com",
        password: "password456",
    },
    MANAGER_CREDENTIALS,
    Credentials {
        username: "john.doe@example.com",
        password: "teacher123",
    },
    Credentials {
        username: "jane.smith@example.com",
        password: "teacher456",
    },
];

/// The seeded deployment always has teacher 1.
const DEFAULT_TEACHER_ID: u64 = 1;

/// The role a session was bootstrapped with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Can create teachers and register students.
    Manager,
    /// A student account, tied to an assigned teacher.
    Regular,
}

/// Per-user authentication state, initialized once at user start.
///
/// When bootstrap fails the session simply stays unauthenticated; tasks that
/// require a token then skip for the rest of the run.
#[derive(Debug)]
pub struct Session {
    pub(crate) token: Option<String>,
    pub(crate) user_id: Option<u64>,
    pub(crate) teacher_id: Option<u64>,
    pub(crate) role: Role,
}

impl Session {
    /// An unauthenticated session.
    pub fn anonymous(role: Role) -> Self {
        Self {
            token: None,
            user_id: None,
            teacher_id: None,
            role,
        }
    }

    /// Whether the session holds a bearer token.
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub(crate) fn bearer(&self) -> Result<&str> {
        self.token.as_deref().context("session is not authenticated")
    }

    /// The teacher targeted by the update task: the user's own assigned
    /// teacher when known, otherwise the seeded default.
    pub(crate) fn teacher_to_update(&self) -> u64 {
        self.teacher_id.unwrap_or(DEFAULT_TEACHER_ID)
    }

    /// Logs in with the credentials of the given role and fetches the
    /// user's profile for its identifiers.
    pub async fn bootstrap(remote: &ApiRemote, role: Role) -> Self {
        let credentials = match role {
            Role::Manager => MANAGER_CREDENTIALS,
            Role::Regular => REGULAR_CREDENTIALS,
        };

        let token = match remote.token(credentials.username, credentials.password).await {
            Ok(response) => response.access_token,
            Err(err) => {
                tracing::error!(?role, "authentication failed: {err}");
                return Self::anonymous(role);
            }
        };

        let mut session = Self {
            token: None,
            user_id: None,
            teacher_id: None,
            role,
        };
        match remote.profile(&token).await {
            Ok(profile) => {
                session.user_id = Some(profile.id);
                if role == Role::Regular {
                    session.teacher_id = profile.additional_info.and_then(|info| info.teacher_id);
                }
                tracing::info!(user_id = profile.id, ?role, "session bootstrapped");
            }
            Err(err) => {
                tracing::error!(?role, "profile fetch failed: {err}");
            }
        }
        session.token = Some(token);
        session
    }
}

/// One entry of the task catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// `GET /api/teachers/public`, no authentication.
    PublicTeachers,
    /// `GET /`.
    Homepage,
    /// `GET /team.html`.
    TeamPage,
    /// `GET /projects.html`.
    ProjectsPage,
    /// `GET /technical.html`.
    TechnicalPage,
    /// `GET /api/me` with the session token.
    Profile,
    /// `GET /api/teachers/` with the session token.
    ListTeachers,
    /// Read-modify-write on `/api/teachers/{id}`, perturbing the age.
    UpdateTeacher,
    /// Read-modify-write on `/api/students/{id}`, perturbing the vocabulary.
    UpdateStudent,
    /// `POST /api/token` with a random known credential pair; the token is
    /// discarded.
    LoginAttempt,
    /// `POST /api/students/`, manager only.
    RegisterStudent,
    /// `POST /api/teachers/`, manager only.
    CreateTeacher,
}

impl Task {
    /// All catalog entries, in weight-table order.
    pub const ALL: [Task; 12] = [
        Task::PublicTeachers,
        Task::Homepage,
        Task::TeamPage,
        Task::ProjectsPage,
        Task::TechnicalPage,
        Task::Profile,
        Task::ListTeachers,
        Task::UpdateTeacher,
        Task::UpdateStudent,
        Task::LoginAttempt,
        Task::RegisterStudent,
        Task::CreateTeacher,
    ];

    /// Display name used in logs and the final report.
    pub fn name(self) -> &'static str {
        match self {
            Task::PublicTeachers => "GET public teachers",
            Task::Homepage => "GET homepage",
            Task::TeamPage => "GET team page",
            Task::ProjectsPage => "GET projects page",
            Task::TechnicalPage => "GET technical page",
            Task::Profile => "GET profile",
            Task::ListTeachers => "GET teachers",
            Task::UpdateTeacher => "PUT update teacher",
            Task::UpdateStudent => "PUT update student",
            Task::LoginAttempt => "POST login",
            Task::RegisterStudent => "POST register student",
            Task::CreateTeacher => "POST create teacher",
        }
    }

    /// Whether the task sends an `Authorization: Bearer` header.
    pub fn needs_token(self) -> bool {
        matches!(
            self,
            Task::Profile
                | Task::ListTeachers
                | Task::UpdateTeacher
                | Task::UpdateStudent
                | Task::RegisterStudent
                | Task::CreateTeacher
        )
    }

    /// Whether the given session can execute this task.
    ///
    /// Selection weights are static and not filtered by eligibility; an
    /// ineligible task is selected, reported as skipped, and never touches
    /// the network.
    pub fn eligible(self, session: &Session) -> bool {
        match self {
            Task::RegisterStudent | Task::CreateTeacher => {
                session.is_authenticated() && session.role == Role::Manager
            }
            Task::UpdateStudent => {
                session.is_authenticated()
                    && session.role == Role::Regular
                    && session.user_id.is_some()
            }
            _ if self.needs_token() => session.is_authenticated(),
            _ => true,
        }
    }
}

/// Relative selection weights for the task catalog.
///
/// The defaults reproduce the traffic mix of the observed user population:
/// read-heavy with occasional writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TaskWeights {
    /// Weight of [`Task::PublicTeachers`].
    pub public_teachers: u8,
    /// Weight of [`Task::Homepage`].
    pub homepage: u8,
    /// Weight of [`Task::TeamPage`].
    pub team_page: u8,
    /// Weight of [`Task::ProjectsPage`].
    pub projects_page: u8,
    /// Weight of [`Task::TechnicalPage`].
    pub technical_page: u8,
    /// Weight of [`Task::Profile`].
    pub profile: u8,
    /// Weight of [`Task::ListTeachers`].
    pub list_teachers: u8,
    /// Weight of [`Task::UpdateTeacher`].
    pub update_teacher: u8,
    /// Weight of [`Task::UpdateStudent`].
    pub update_student: u8,
    /// Weight of [`Task::LoginAttempt`].
    pub login_attempt: u8,
    /// Weight of [`Task::RegisterStudent`].
    pub register_student: u8,
    /// Weight of [`Task::CreateTeacher`].
    pub create_teacher: u8,
}

impl Default for TaskWeights {
    fn default() -> Self {
        Self {
            public_teachers: 10,
            homepage: 8,
            team_page: 5,
            projects_page: 5,
            technical_page: 5,
            profile: 5,
            list_teachers: 3,
            update_teacher: 2,
            update_student: 2,
            login_attempt: 10,
            register_student: 1,
            create_teacher: 1,
        }
    }
}

impl TaskWeights {
    fn as_array(&self) -> [u8; Task::ALL.len()] {
        [
            self.public_teachers,
            self.homepage,
            self.team_page,
            self.projects_page,
            self.technical_page,
            self.profile,
            self.list_teachers,
            self.update_teacher,
            self.update_student,
            self.login_attempt,
            self.register_student,
            self.create_teacher,
        ]
    }
}

/// A builder for creating a [`Scenario`].
#[derive(Debug)]
pub struct ScenarioBuilder {
    name: String,
    users: usize,
    seed: u64,

    wait_min: Duration,
    wait_max: Duration,
    manager_ratio: f64,
    weights: TaskWeights,
}

impl ScenarioBuilder {
    /// The number of simulated users running this scenario.
    pub fn users(mut self, users: usize) -> Self {
        self.users = users;
        self
    }

    /// Think-time bounds between consecutive tasks.
    pub fn wait(mut self, min: Duration, max: Duration) -> Self {
        self.wait_min = min;
        self.wait_max = max.max(min);
        self
    }

    /// Probability of bootstrapping a user with manager credentials.
    pub fn manager_ratio(mut self, ratio: f64) -> Self {
        self.manager_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Relative selection weights for the task catalog.
    pub fn weights(mut self, weights: TaskWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Fixes the RNG seed, for deterministic behavior in tests.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Creates the scenario instance.
    pub fn build(self) -> Scenario {
        let task_distribution = WeightedIndex::new(self.weights.as_array()).unwrap();

        Scenario {
            name: self.name,
            users: self.users,
            seed: self.seed,

            wait_min: self.wait_min,
            wait_max: self.wait_max,
            manager_ratio: self.manager_ratio,
            task_distribution,
        }
    }
}

/// Specification of one load scenario: a population of simulated users
/// sharing the same behavior.
#[derive(Debug)]
pub struct Scenario {
    /// Name of the scenario for identification in logs and the report.
    pub(crate) name: String,
    /// The number of simulated users running this scenario.
    pub(crate) users: usize,

    seed: u64,
    wait_min: Duration,
    wait_max: Duration,
    manager_ratio: f64,
    task_distribution: WeightedIndex<u8>,
}

impl Scenario {
    /// Constructs a new scenario builder with the given name.
    pub fn builder(name: impl Into<String>) -> ScenarioBuilder {
        ScenarioBuilder {
            name: name.into(),
            users: 1,
            seed: rand::random(),

            wait_min: Duration::from_secs(1),
            wait_max: Duration::from_secs(5),
            manager_ratio: 0.2,
            weights: TaskWeights::default(),
        }
    }

    /// Creates the behavior for one user, with a seed derived from the
    /// scenario seed so every user walks its own random sequence.
    pub fn behavior(&self, user_index: usize) -> UserBehavior {
        UserBehavior {
            rng: SmallRng::seed_from_u64(self.seed.wrapping_add(user_index as u64)),
            task_distribution: self.task_distribution.clone(),
            wait_min: self.wait_min,
            wait_max: self.wait_max,
            manager_ratio: self.manager_ratio,
        }
    }
}

/// Drives one simulated user: task selection, pacing and payload synthesis.
#[derive(Debug)]
pub struct UserBehavior {
    /// The RNG driving all our distributions.
    rng: SmallRng,
    /// A distribution that picks the next task from the catalog.
    task_distribution: WeightedIndex<u8>,

    wait_min: Duration,
    wait_max: Duration,
    manager_ratio: f64,
}

impl UserBehavior {
    /// Samples a think-time delay, uniform within the configured bounds.
    pub fn think_time(&mut self) -> Duration {
        self.rng.random_range(self.wait_min..=self.wait_max)
    }

    /// Samples the next task from the weighted catalog.
    pub fn next_task(&mut self) -> Task {
        Task::ALL[self.task_distribution.sample(&mut self.rng)]
    }

    /// Picks the role this user logs in with.
    pub fn pick_role(&mut self) -> Role {
        if self.rng.random_bool(self.manager_ratio) {
            Role::Manager
        } else {
            Role::Regular
        }
    }

    pub(crate) fn login_credentials(&mut self) -> Credentials {
        KNOWN_LOGINS[self.rng.random_range(0..KNOWN_LOGINS.len())]
    }

    pub(crate) fn vocabulary_delta(&mut self) -> i64 {
        self.rng.random_range(-10..=10)
    }

    pub(crate) fn age_delta(&mut self) -> i64 {
        self.rng.random_range(-1..=1)
    }

    /// Synthesizes a student registration payload with a unique identifier
    /// baked into the name and email to avoid collisions.
    pub fn student_payload(&mut self) -> StudentPayload {
        let unique = unique_suffix();
        StudentPayload {
            student: Student {
                first_name: format!("Test{unique}"),
                last_name: format!("Student{unique}"),
                age: self.rng.random_range(18..=45),
                sex: self.pick(&["M", "F"]),
                email: format!("test.student{unique}@example.com"),
                level: self.pick(&["A1", "A2", "B1", "B2", "C1", "C2"]),
                vocabulary: self.rng.random_range(500..=3000),
                teacher_id: DEFAULT_TEACHER_ID,
            },
            password: "testpassword123".to_owned(),
        }
    }

    /// Synthesizes a teacher creation payload with a unique identifier
    /// baked into the name and email.
    pub fn teacher_payload(&mut self) -> TeacherPayload {
        let unique = unique_suffix();
        TeacherPayload {
            teacher: Teacher {
                first_name: format!("Teacher{unique}"),
                last_name: format!("Last{unique}"),
                age: self.rng.random_range(25..=60),
                sex: self.pick(&["M", "F"]),
                qualification: self.pick(&["B2", "C1", "C2"]),
                email: format!("teacher{unique}@example.com"),
            },
            password: "teacherpass123".to_owned(),
        }
    }

    fn pick(&mut self, options: &[&'static str]) -> String {
        options[self.rng.random_range(0..options.len())].to_owned()
    }
}

/// Returns an update resubmitting the student record with only the
/// vocabulary changed, plus the unchanged known password.
pub fn perturb_vocabulary(student: Student, delta: i64) -> StudentPayload {
    StudentPayload {
        student: Student {
            vocabulary: student.vocabulary + delta,
            ..student
        },
        password: REGULAR_CREDENTIALS.password.to_owned(),
    }
}

/// Returns the teacher record with only the age changed, kept within
/// plausible bounds.
pub fn perturb_age(teacher: Teacher, delta: i64) -> Teacher {
    let age = (teacher.age as i64 + delta).clamp(18, 99) as u32;
    Teacher { age, ..teacher }
}

fn unique_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn behavior(seed: u64) -> UserBehavior {
        Scenario::builder("test").seed(seed).build().behavior(0)
    }

    #[test]
    fn think_time_stays_within_bounds() {
        let min = Duration::from_millis(100);
        let max = Duration::from_millis(300);
        let mut behavior = Scenario::builder("test")
            .wait(min, max)
            .seed(7)
            .build()
            .behavior(3);

        for _ in 0..1000 {
            let wait = behavior.think_time();
            assert!(wait >= min && wait <= max, "{wait:?} out of bounds");
        }
    }

    #[test]
    fn zero_weight_tasks_are_never_selected() {
        let weights = TaskWeights {
            login_attempt: 0,
            register_student: 0,
            create_teacher: 0,
            ..Default::default()
        };
        let mut behavior = Scenario::builder("test")
            .weights(weights)
            .seed(1)
            .build()
            .behavior(0);

        for _ in 0..5000 {
            let task = behavior.next_task();
            assert!(!matches!(
                task,
                Task::LoginAttempt | Task::RegisterStudent | Task::CreateTeacher
            ));
        }
    }

    #[test]
    fn weights_drive_relative_frequencies() {
        let weights = TaskWeights {
            public_teachers: 9,
            homepage: 1,
            team_page: 0,
            projects_page: 0,
            technical_page: 0,
            profile: 0,
            list_teachers: 0,
            update_teacher: 0,
            update_student: 0,
            login_attempt: 0,
            register_student: 0,
            create_teacher: 0,
        };
        let mut behavior = Scenario::builder("test")
            .weights(weights)
            .seed(1234)
            .build()
            .behavior(0);

        let samples = 10_000;
        let homepage = (0..samples)
            .filter(|_| behavior.next_task() == Task::Homepage)
            .count();
        let ratio = homepage as f64 / samples as f64;
        assert!((0.07..0.13).contains(&ratio), "ratio was {ratio}");
    }

    #[test]
    fn unauthenticated_sessions_make_token_tasks_ineligible() {
        let session = Session::anonymous(Role::Regular);
        for task in Task::ALL {
            if task.needs_token() {
                assert!(!task.eligible(&session), "{} should skip", task.name());
            } else {
                assert!(task.eligible(&session), "{} should run", task.name());
            }
        }
    }

    #[test]
    fn manager_only_tasks_need_the_manager_role() {
        let regular = Session {
            token: Some("token".to_owned()),
            user_id: Some(2),
            teacher_id: Some(1),
            role: Role::Regular,
        };
        assert!(!Task::RegisterStudent.eligible(&regular));
        assert!(!Task::CreateTeacher.eligible(&regular));
        assert!(Task::UpdateStudent.eligible(&regular));

        let manager = Session {
            token: Some("token".to_owned()),
            user_id: Some(1),
            teacher_id: None,
            role: Role::Manager,
        };
        assert!(Task::RegisterStudent.eligible(&manager));
        assert!(Task::CreateTeacher.eligible(&manager));
        assert!(!Task::UpdateStudent.eligible(&manager));
    }

    #[test]
    fn vocabulary_perturbation_preserves_other_fields() {
        let student = Student {
            first_name: "Alice".to_owned(),
            last_name: "Brown".to_owned(),
            age: 27,
            sex: "F".to_owned(),
            email: "alice@example.com".to_owned(),
            level: "B2".to_owned(),
            vocabulary: 1200,
            teacher_id: 1,
        };

        let update = perturb_vocabulary(student.clone(), -7);

        let mut expected = student;
        expected.vocabulary -= 7;
        assert_eq!(update.student, expected);
        assert_eq!(update.password, "password123");
    }

    #[test]
    fn age_perturbation_stays_within_bounds() {
        let teacher = Teacher {
            first_name: "John".to_owned(),
            last_name: "Doe".to_owned(),
            age: 18,
            sex: "M".to_owned(),
            qualification: "C2".to_owned(),
            email: "john.doe@example.com".to_owned(),
        };

        let update = perturb_age(teacher.clone(), -1);
        assert_eq!(update.age, 18);

        let update = perturb_age(teacher, 1);
        assert_eq!(update.age, 19);
    }

    #[test]
    fn creation_payloads_use_unique_identifiers() {
        let mut behavior = behavior(42);

        let first = behavior.student_payload();
        let second = behavior.student_payload();
        assert_ne!(first.student.email, second.student.email);

        let first = behavior.teacher_payload();
        let second = behavior.teacher_payload();
        assert_ne!(first.teacher.email, second.teacher.email);
    }
}
