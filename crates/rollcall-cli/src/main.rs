use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use rollcall_camera::Camera;
use rollcall_core::{pipeline, OnnxFaceExtractor};
use rollcall_store::{AttendanceStore, NewStudent};

mod attend;

#[derive(Parser)]
#[command(name = "rollcall", about = "rollcall attendance CLI")]
struct Cli {
    /// Path to the SQLite database (defaults to ROLLCALL_DB_PATH or the
    /// standard data directory).
    #[arg(long)]
    db: Option<PathBuf>,
    /// Directory containing the ONNX model files.
    #[arg(long)]
    model_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a student from a photo containing exactly one face
    Enroll {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: String,
        /// Path to the enrollment photo
        #[arg(long)]
        photo: PathBuf,
    },
    /// Manage enrolled students
    Students {
        #[command(subcommand)]
        command: StudentsCommand,
    },
    /// Manage instructors
    Instructors {
        #[command(subcommand)]
        command: InstructorsCommand,
    },
    /// Manage class sessions
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },
    /// Run a live attendance session against the local camera
    Attend {
        /// Existing class session id; a new session is created when omitted
        #[arg(long)]
        session: Option<i64>,
        /// Subject for a newly created session
        #[arg(long, default_value = "desktop-session")]
        subject: String,
        #[arg(long, default_value = "/dev/video0")]
        camera: String,
        #[arg(long, default_value_t = rollcall_core::DEFAULT_TOLERANCE)]
        tolerance: f32,
    },
}

#[derive(Subcommand)]
enum StudentsCommand {
    /// List enrolled students
    List,
    /// Show one student with attendance statistics
    Show { id: i64 },
    /// Remove a student and their attendance records
    Remove { id: i64 },
}

#[derive(Subcommand)]
enum InstructorsCommand {
    /// Add an instructor
    Add {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        email: String,
    },
    /// List instructors
    List,
}

#[derive(Subcommand)]
enum SessionsCommand {
    /// List class sessions
    List,
    /// Close a session (set its end time)
    End { id: i64 },
    /// Show session attendance statistics
    Stats { id: i64 },
    /// Export a session's attendance as CSV
    Export {
        id: i64,
        /// Output file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let db_path = cli
        .db
        .clone()
        .or_else(|| std::env::var("ROLLCALL_DB_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(rollcall_store::default_db_path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let store = AttendanceStore::open(&db_path)
        .await
        .with_context(|| format!("opening database {}", db_path.display()))?;

    match cli.command {
        Commands::Enroll {
            first_name,
            last_name,
            email,
            photo,
        } => {
            let mut extractor = load_extractor(&cli.model_dir)?;
            let bytes = std::fs::read(&photo)
                .with_context(|| format!("reading photo {}", photo.display()))?;
            let frame = pipeline::decode_frame(&bytes).context("decoding photo")?;
            let vector = pipeline::encode_single_face(&mut extractor, &frame)
                .context("encoding enrollment photo")?;

            let id = store
                .add_student(NewStudent {
                    first_name: first_name.clone(),
                    last_name: last_name.clone(),
                    email,
                    photo_path: Some(photo.display().to_string()),
                    vector: Some(vector),
                })
                .await?;
            println!("enrolled {first_name} {last_name} with id {id}");
        }

        Commands::Students { command } => match command {
            StudentsCommand::List => {
                for student in store.list_students().await? {
                    let vector = if student.has_vector { "enrolled" } else { "no vector" };
                    println!(
                        "{:>4}  {} {} <{}> [{vector}]",
                        student.id, student.first_name, student.last_name, student.email
                    );
                }
            }
            StudentsCommand::Show { id } => {
                let student = store.student(id).await?;
                let stats = store.student_stats(id).await?;
                println!("{} {} <{}>", student.first_name, student.last_name, student.email);
                println!(
                    "  attended {}/{} sessions ({:.1}%)",
                    stats.attended, stats.total_sessions, stats.attendance_rate
                );
            }
            StudentsCommand::Remove { id } => {
                store.remove_student(id).await?;
                println!("removed student {id}");
            }
        },

        Commands::Instructors { command } => match command {
            InstructorsCommand::Add {
                first_name,
                last_name,
                subject,
                email,
            } => {
                let id = store
                    .add_instructor(&first_name, &last_name, &subject, &email)
                    .await?;
                println!("added instructor {first_name} {last_name} with id {id}");
            }
            InstructorsCommand::List => {
                for instructor in store.list_instructors().await? {
                    println!(
                        "{:>4}  {} {} ({})",
                        instructor.id, instructor.first_name, instructor.last_name,
                        instructor.subject
                    );
                }
            }
        },

        Commands::Sessions { command } => match command {
            SessionsCommand::List => {
                for session in store.list_sessions().await? {
                    let status = if session.end_time.is_some() { "closed" } else { "open" };
                    println!(
                        "{:>4}  {} {} [{status}] {}",
                        session.id,
                        session.session_date,
                        session.subject,
                        session.instructor_name.as_deref().unwrap_or("-")
                    );
                }
            }
            SessionsCommand::End { id } => {
                store.end_session(id).await?;
                print_stats(id, &store.session_stats(id).await?);
            }
            SessionsCommand::Stats { id } => {
                store.session(id).await?;
                print_stats(id, &store.session_stats(id).await?);
            }
            SessionsCommand::Export { id, out } => {
                store.session(id).await?;
                let csv = store.export_csv(id).await?;
                match out {
                    Some(path) => {
                        std::fs::write(&path, csv)
                            .with_context(|| format!("writing {}", path.display()))?;
                        println!("exported session {id} to {}", path.display());
                    }
                    None => print!("{csv}"),
                }
            }
        },

        Commands::Attend {
            session,
            subject,
            camera,
            tolerance,
        } => {
            let mut extractor = load_extractor(&cli.model_dir)?;
            let mut camera = Camera::open(&camera)
                .with_context(|| format!("opening camera {camera}"))?;

            let session_id = match session {
                Some(id) => {
                    store.session(id).await?;
                    id
                }
                None => store.create_session(None, &subject, None).await?,
            };

            // Gallery refresh happens at session start, never on a timer.
            let gallery = store.load_gallery().await?;
            println!("session {session_id}: {} enrolled students, ctrl-c to finish", gallery.len());

            let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                let _ = stop_tx.send(true);
            });

            let options = attend::AttendOptions {
                tolerance,
                ..attend::AttendOptions::default()
            };
            let stats = attend::run_session(
                &mut camera,
                &mut extractor,
                &store,
                &gallery,
                session_id,
                &options,
                &stop_rx,
            )
            .await?;

            println!("session {session_id} complete");
            print_stats(session_id, &stats);
        }
    }

    Ok(())
}

fn load_extractor(model_dir: &Option<PathBuf>) -> Result<OnnxFaceExtractor> {
    let model_dir = model_dir
        .clone()
        .or_else(|| std::env::var("ROLLCALL_MODEL_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(rollcall_core::default_model_dir);
    OnnxFaceExtractor::load(
        &model_dir.join("det_10g.onnx"),
        &model_dir.join("w600k_r50.onnx"),
    )
    .context("loading face models")
}

fn print_stats(session_id: i64, stats: &rollcall_store::SessionStats) {
    println!("session {session_id}:");
    println!("  present: {}/{}", stats.present, stats.total);
    println!("  absent:  {}", stats.absent);
    println!("  rate:    {:.1}%", stats.percentage);
}
