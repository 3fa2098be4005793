//! coursetrack CLI - enrollment progress service and offline tooling.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use coursetrack_api::AppState;
use coursetrack_core::{Course, CourseId, Enrollment, EnrollmentId, EnrollmentState, Lesson, LessonId, UserId};
use coursetrack_progress::{EnrollmentTracker, MembershipPolicy, ProgressFilter, TrackerConfig};
use coursetrack_storage::{JsonStorage, Storage};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "coursetrack")]
#[command(about = "Course enrollment and lesson progress tracking", long_about = None)]
struct Cli {
    /// Data directory for the record store
    #[arg(long, env = "COURSETRACK_DATA_DIR", default_value = ".coursetrack", global = true)]
    data_dir: PathBuf,

    /// Storage backend
    #[arg(long, env = "COURSETRACK_BACKEND", value_enum, default_value_t = Backend::Json, global = true)]
    backend: Backend,

    /// How lesson ids outside the course are handled (enforce or tolerate)
    #[arg(long, env = "COURSETRACK_MEMBERSHIP", default_value = "enforce", global = true)]
    membership: MembershipPolicy,

    /// Attempts for a contended progress update
    #[arg(long, env = "COURSETRACK_MAX_UPDATE_ATTEMPTS", default_value = "5", global = true)]
    max_update_attempts: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// One JSON file per record
    Json,
    /// SQLite database in the data directory
    Sqlite,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Listen address
        #[arg(long, env = "COURSETRACK_ADDR", default_value = "127.0.0.1:3000")]
        addr: SocketAddr,
    },
    /// Manage courses
    Course {
        #[command(subcommand)]
        command: CourseCommands,
    },
    /// Manage lessons
    Lesson {
        #[command(subcommand)]
        command: LessonCommands,
    },
    /// Enroll a user in a course
    Enroll {
        /// User ID
        #[arg(long)]
        user: UserId,
        /// Course ID
        #[arg(long)]
        course: CourseId,
    },
    /// Mark a lesson complete (or incomplete with --undo)
    Complete {
        /// Owning user ID
        #[arg(long)]
        user: UserId,
        /// Enrollment ID
        #[arg(long)]
        enrollment: EnrollmentId,
        /// Lesson ID
        #[arg(long)]
        lesson: LessonId,
        /// Unmark instead of mark
        #[arg(long)]
        undo: bool,
    },
    /// Show a user's enrollments
    Status {
        /// User ID
        #[arg(long)]
        user: UserId,
    },
    /// Show the students of an instructor's courses
    Students {
        /// Instructor user ID
        #[arg(long)]
        instructor: UserId,
        /// Only this course
        #[arg(long)]
        course: Option<CourseId>,
        /// all, not-started, in-progress or completed
        #[arg(long, default_value = "all")]
        progress: ProgressFilter,
    },
}

#[derive(Subcommand)]
enum CourseCommands {
    /// Create a course
    Add {
        /// Course title
        title: String,
        /// Instructor user ID
        #[arg(long)]
        instructor: UserId,
        /// Description
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List courses
    List,
}

#[derive(Subcommand)]
enum LessonCommands {
    /// Add a lesson to a course
    Add {
        /// Course ID
        #[arg(long)]
        course: CourseId,
        /// Lesson title
        title: String,
        /// Video URL
        #[arg(long)]
        video_url: String,
        /// Position within the course
        #[arg(long)]
        order: u32,
    },
    /// List a course's lessons
    List {
        /// Course ID
        #[arg(long)]
        course: CourseId,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let storage = open_storage(cli.backend, &cli.data_dir).await?;
    let tracker = EnrollmentTracker::new(storage.clone()).with_config(TrackerConfig {
        membership: cli.membership,
        max_update_attempts: cli.max_update_attempts,
    });

    match cli.command {
        Commands::Serve { addr } => {
            info!(
                data_dir = %cli.data_dir.display(),
                backend = ?cli.backend,
                membership = ?cli.membership,
                "starting server"
            );
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("could not bind to {addr}"))?;
            coursetrack_api::serve(listener, AppState::new(tracker)).await?;
        }
        Commands::Course { command } => match command {
            CourseCommands::Add { title, instructor, description } => {
                let course = Course::new(title, description, instructor)?;
                storage.save_course(&course).await?;
                println!("Added course: {} - {}", course.id, course.title);
            }
            CourseCommands::List => {
                let courses = storage.list_courses().await?;
                println!("Courses ({})", courses.len());
                for course in courses {
                    println!("  {} | {} | {}", course.id, course.slug, course.title);
                }
            }
        },
        Commands::Lesson { command } => match command {
            LessonCommands::Add { course, title, video_url, order } => {
                if storage.load_course(course).await?.is_none() {
                    anyhow::bail!("Course not found: {course}");
                }
                let lesson = Lesson::new(course, title, video_url, order)?;
                storage.save_lesson(&lesson).await?;
                tracker.resync_course(course).await?;
                println!("Added lesson: {} - {}. {}", lesson.id, lesson.order, lesson.title);
            }
            LessonCommands::List { course } => {
                let lessons = storage.list_lessons(course).await?;
                println!("Lessons ({})", lessons.len());
                for lesson in lessons {
                    println!("  {} | {}. {}", lesson.id, lesson.order, lesson.title);
                }
            }
        },
        Commands::Enroll { user, course } => {
            let enrollment = tracker.create_enrollment(user, course).await?;
            println!("Enrolled: {}", enrollment.id);
        }
        Commands::Complete { user, enrollment, lesson, undo } => {
            let enrollment = tracker
                .set_lesson_completion(user, enrollment, lesson, !undo)
                .await?;
            println!(
                "Enrollment {}: {}% ({})",
                enrollment.id,
                enrollment.progress,
                format_state(&enrollment)
            );
        }
        Commands::Status { user } => {
            let enrollments = tracker.list_enrollments(user).await?;
            println!("Enrollments ({})", enrollments.len());
            for enrollment in enrollments {
                println!(
                    "  {} | course {} | {:>3}% | {} lessons | {}",
                    enrollment.id,
                    enrollment.course_id,
                    enrollment.progress,
                    enrollment.completed_lessons.len(),
                    format_state(&enrollment),
                );
            }
        }
        Commands::Students { instructor, course, progress } => {
            let students = tracker.student_roster(instructor, course, progress).await?;
            println!("Students ({})", students.len());
            for student in students {
                println!(
                    "  {} | {} enrollments | avg {:>3}% | {} completed",
                    student.user_id,
                    student.total_enrollments,
                    student.average_progress,
                    student.completed_courses,
                );
                for course in student.enrolled_courses {
                    println!("      {:>3}% {}", course.progress, course.title);
                }
            }
        }
    }

    Ok(())
}

async fn open_storage(backend: Backend, data_dir: &Path) -> Result<Arc<dyn Storage>> {
    match backend {
        Backend::Json => {
            let storage = JsonStorage::new(data_dir)
                .await
                .with_context(|| format!("could not open data directory {}", data_dir.display()))?;
            Ok(Arc::new(storage))
        }
        Backend::Sqlite => open_sqlite(data_dir).await,
    }
}

#[cfg(feature = "sqlite")]
async fn open_sqlite(data_dir: &Path) -> Result<Arc<dyn Storage>> {
    tokio::fs::create_dir_all(data_dir).await?;
    let path = data_dir.join("coursetrack.db");
    let storage = coursetrack_storage::SqliteStorage::new(&format!("sqlite://{}", path.display()))
        .await
        .with_context(|| format!("could not open database {}", path.display()))?;
    Ok(Arc::new(storage))
}

#[cfg(not(feature = "sqlite"))]
async fn open_sqlite(_data_dir: &Path) -> Result<Arc<dyn Storage>> {
    anyhow::bail!("this build does not include the sqlite backend; rebuild with `--features sqlite`")
}

fn format_state(enrollment: &Enrollment) -> String {
    match (enrollment.state(), enrollment.completed_at) {
        (EnrollmentState::Completed, Some(at)) => format!("COMPLETED at {}", at.to_rfc3339()),
        (EnrollmentState::Completed, None) => "COMPLETED".to_string(),
        (EnrollmentState::InProgress, _) => "IN PROGRESS".to_string(),
        (EnrollmentState::NotStarted, _) => "NOT STARTED".to_string(),
    }
}
