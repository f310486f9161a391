//! The `academy` command line.
//!
//! Every subcommand runs one core operation as the caller given by `--role`
//! and `--operator`, prints the result as JSON on stdout, and exits non-zero
//! with `KIND: message` on stderr when the operation fails.

pub mod seeder;

use chrono::{NaiveDate, NaiveTime, Weekday};
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use academy_config::DatabaseConfig;
use academy_core::{AppError, AuthorizationContext, Role};
use academy_db::{init_db_pool, run_migrations};
use academy_models::{
    ApprovePaymentDto, AssignStudentDto, BatchId, CreateBatchDto, CreateFeeDto, FeeId, LevelId,
    PaymentId, RecordTestDto, RejectPaymentDto, Schedule, StudentId, SubjectMark,
    SubmitPaymentDto, TeacherId, UpsertLevelDto,
};

use crate::modules::{EnrollmentService, PaymentService, ScoringService};
use crate::state::{AppState, init_app_state};

pub use seeder::{SeedPlan, SeedSummary, seed_database};

#[derive(Parser, Debug)]
#[command(name = "academy")]
#[command(about = "Academy core: enrollment, scoring and fee payments", long_about = None)]
pub struct Cli {
    /// Role the command runs as (admin, teacher, parent)
    #[arg(long, global = true, default_value = "admin")]
    pub role: Role,

    /// User id recorded as the caller; defaults to the nil id
    #[arg(long, global = true)]
    pub operator: Option<Uuid>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn context(&self) -> AuthorizationContext {
        AuthorizationContext::new(self.operator.unwrap_or_else(Uuid::nil), self.role)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply pending database migrations
    Migrate,

    /// Fill the database with fake levels, batches, students and fees
    Seed {
        #[arg(long, default_value = "3")]
        levels: i32,
        #[arg(long, default_value = "2")]
        batches_per_level: usize,
        #[arg(short, long, default_value = "50")]
        students: usize,
    },

    /// Create or replace a curriculum level
    DefineLevel {
        #[arg(long)]
        id: i32,
        #[arg(long)]
        name: String,
        /// Percent a test needs to count as passed
        #[arg(long)]
        passing_percent: Option<f64>,
    },

    /// Create a batch
    CreateBatch {
        #[arg(long)]
        name: String,
        #[arg(long)]
        level: i32,
        /// Meeting days, comma separated (mon,wed,fri)
        #[arg(long, value_delimiter = ',', required = true)]
        days: Vec<Weekday>,
        /// Start time, HH:MM
        #[arg(long, value_parser = parse_time)]
        starts_at: NaiveTime,
        /// End time, HH:MM
        #[arg(long, value_parser = parse_time)]
        ends_at: NaiveTime,
        /// Omit for an unlimited batch
        #[arg(long)]
        capacity: Option<i64>,
        #[arg(long)]
        teacher: Option<TeacherId>,
    },

    /// Assign a student to a batch, moving them out of any previous batch
    Assign {
        #[arg(long)]
        student: StudentId,
        #[arg(long)]
        batch: BatchId,
    },

    /// Remove a student from their batch
    Unassign {
        #[arg(long)]
        student: StudentId,
    },

    /// Change a batch's capacity; omit --capacity to lift the limit
    SetCapacity {
        #[arg(long)]
        batch: BatchId,
        #[arg(long)]
        capacity: Option<i64>,
    },

    /// Delete an empty batch
    DeleteBatch {
        #[arg(long)]
        batch: BatchId,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show a batch's enrollment count and remaining seats
    Occupancy {
        #[arg(long)]
        batch: BatchId,
    },

    /// Record a test with one or more subjects
    RecordTest {
        #[arg(long)]
        student: StudentId,
        #[arg(long)]
        batch: BatchId,
        #[arg(long)]
        level: i32,
        /// Test date, YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        name: Option<String>,
        /// Subject marks as NAME:OBTAINED/TOTAL, repeatable
        #[arg(long = "subject", value_parser = parse_subject, required = true)]
        subjects: Vec<SubjectMark>,
    },

    /// Summarize a student's tests for one level, or every level up to their current one
    Summary {
        #[arg(long)]
        student: StudentId,
        #[arg(long)]
        level: Option<i32>,
    },

    /// Assess a fee against a student
    AssessFee {
        #[arg(long)]
        student: StudentId,
        #[arg(long)]
        amount: Decimal,
        /// Due date, YYYY-MM-DD
        #[arg(long)]
        due: NaiveDate,
    },

    /// Submit proof of payment for review
    SubmitPayment {
        #[arg(long)]
        fee: FeeId,
        #[arg(long)]
        student: StudentId,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        transaction: String,
        #[arg(long)]
        receipt: Option<String>,
    },

    /// Approve a pending payment and credit its fee
    Approve {
        #[arg(long)]
        payment: PaymentId,
        #[arg(long)]
        note: Option<String>,
    },

    /// Reject a pending payment
    Reject {
        #[arg(long)]
        payment: PaymentId,
        #[arg(long)]
        reason: String,
    },

    /// Show a fee with its outstanding balance and payments
    Statement {
        #[arg(long)]
        fee: FeeId,
    },
}

/// Runs one parsed command to completion.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let ctx = cli.context();

    if let Commands::Migrate = cli.command {
        let pool = init_db_pool(&DatabaseConfig::from_env()?).await?;
        run_migrations(&pool).await?;
        println!("✅ Migrations applied");
        return Ok(());
    }

    let state = init_app_state().await?;
    dispatch(&state, &ctx, cli.command).await
}

/// Runs a command against an already built state. `Migrate` needs a database
/// pool and is handled by [`run`].
pub async fn dispatch(
    state: &AppState,
    ctx: &AuthorizationContext,
    command: Commands,
) -> anyhow::Result<()> {
    match command {
        Commands::Migrate => {
            anyhow::bail!("migrate must be run through the database entry point")
        }
        Commands::Seed {
            levels,
            batches_per_level,
            students,
        } => {
            let plan = SeedPlan {
                levels,
                batches_per_level,
                students,
            };
            let summary = seed_database(state.store.as_ref(), plan).await?;
            print_json(&summary)
        }
        Commands::DefineLevel {
            id,
            name,
            passing_percent,
        } => {
            let dto = UpsertLevelDto {
                id,
                name,
                passing_percent,
            };
            print_json(&ScoringService::define_level(state, ctx, dto).await?)
        }
        Commands::CreateBatch {
            name,
            level,
            days,
            starts_at,
            ends_at,
            capacity,
            teacher,
        } => {
            let dto = CreateBatchDto {
                name,
                level_id: level,
                teacher_id: teacher,
                schedule: Schedule {
                    days,
                    starts_at,
                    ends_at,
                },
                capacity,
            };
            print_json(&EnrollmentService::create_batch(state, ctx, dto).await?)
        }
        Commands::Assign { student, batch } => {
            let dto = AssignStudentDto {
                student_id: student,
                batch_id: batch,
            };
            print_json(&EnrollmentService::assign_student(state, ctx, dto).await?)
        }
        Commands::Unassign { student } => {
            print_json(&EnrollmentService::remove_student(state, ctx, student).await?)
        }
        Commands::SetCapacity { batch, capacity } => {
            print_json(&EnrollmentService::change_capacity(state, ctx, batch, capacity).await?)
        }
        Commands::DeleteBatch { batch, yes } => {
            if !yes && !confirm(&format!("Delete batch {}?", batch))? {
                println!("Aborted");
                return Ok(());
            }
            EnrollmentService::delete_batch(state, ctx, batch).await?;
            println!("✅ Batch {} deleted", batch);
            Ok(())
        }
        Commands::Occupancy { batch } => {
            print_json(&EnrollmentService::batch_occupancy(state, ctx, batch).await?)
        }
        Commands::RecordTest {
            student,
            batch,
            level,
            date,
            name,
            subjects,
        } => {
            let dto = RecordTestDto {
                student_id: student,
                batch_id: batch,
                level,
                name,
                date,
                subjects,
            };
            print_json(&ScoringService::record_test(state, ctx, dto).await?)
        }
        Commands::Summary { student, level } => match level {
            Some(level) => {
                print_json(&ScoringService::level_summary(state, ctx, student, LevelId(level)).await?)
            }
            None => print_json(&ScoringService::all_levels_summary(state, ctx, student).await?),
        },
        Commands::AssessFee {
            student,
            amount,
            due,
        } => {
            let dto = CreateFeeDto {
                student_id: student,
                amount,
                due_date: due,
            };
            print_json(&PaymentService::assess_fee(state, ctx, dto).await?)
        }
        Commands::SubmitPayment {
            fee,
            student,
            amount,
            transaction,
            receipt,
        } => {
            let dto = SubmitPaymentDto {
                fee_id: fee,
                student_id: student,
                amount,
                transaction_id: transaction,
                receipt_ref: receipt,
            };
            print_json(&PaymentService::submit_payment(state, ctx, dto).await?)
        }
        Commands::Approve { payment, note } => {
            let dto = ApprovePaymentDto { note };
            print_json(&PaymentService::approve_payment(state, ctx, payment, dto).await?)
        }
        Commands::Reject { payment, reason } => {
            let dto = RejectPaymentDto { reason };
            print_json(&PaymentService::reject_payment(state, ctx, payment, dto).await?)
        }
        Commands::Statement { fee } => {
            print_json(&PaymentService::fee_statement(state, ctx, fee).await?)
        }
    }
}

/// Writes a failed command to stderr. Core errors are printed with their kind,
/// plus one line per field for validation failures.
pub fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<AppError>() {
        Some(app) => {
            eprintln!("❌ {}: {}", app.kind(), app);
            if let Some(fields) = app.field_errors() {
                for field in fields.iter() {
                    eprintln!("   {}", field);
                }
            }
        }
        None => eprintln!("❌ {:#}", err),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}

fn parse_time(value: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| format!("'{}' is not a time like 16:30", value))
}

/// Parses `NAME:OBTAINED/TOTAL`, e.g. `Maths:45/50`.
fn parse_subject(value: &str) -> Result<SubjectMark, String> {
    let invalid = || format!("'{}' is not a subject like Maths:45/50", value);

    let (name, marks) = value.rsplit_once(':').ok_or_else(invalid)?;
    let (obtained, total) = marks.split_once('/').ok_or_else(invalid)?;
    let obtained: f64 = obtained.trim().parse().map_err(|_| invalid())?;
    let total: f64 = total.trim().parse().map_err(|_| invalid())?;

    Ok(SubjectMark::new(name.trim(), obtained, total))
}
