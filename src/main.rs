use chrono::{Duration as ChronoDuration, Utc};
use failure::Fallible;
use futures::Future;
use ledgergroups::{
    config::Settings,
    dal::DB,
    error::Error,
    logic::{Membership, Service},
    schema::{GroupId, UserId},
    util::log_err,
    view::{render, render_error, render_invite},
};
use log::warn;
use std::{process::exit, time::Duration};
use structopt::StructOpt;
use tokio::runtime::Builder;

fn main() {
    dotenv::dotenv().ok();

    let options = Options::from_args();
    if let Err(err) = options.start_logger() {
        warn!("Logging couldn't start: {}", err);
    }

    match run(options) {
        Ok(output) => println!("{}", output),
        Err(err) => match err.downcast::<Error>() {
            Ok(ref err) if err.is_recoverable() => {
                println!("{}", render_error(err));
                exit(2);
            }
            Ok(err) => {
                log_err(&err.into());
                exit(1);
            }
            Err(err) => {
                log_err(&err);
                exit(1);
            }
        },
    }
}

fn run(options: Options) -> Fallible<String> {
    let mut runtime = Builder::new().build()?;
    let db = DB::connect(&options.database_url)?;
    let membership = Membership::new(db.clone(), db, options.settings());
    let service = Service::new(membership);

    let output = match options.command {
        Command::SignUp { name } => {
            let (user, group) = runtime.block_on(service.run(move |m| m.sign_up(&name)))?;
            render(serde_json::json!({ "user": user, "group": group }))?
        }
        Command::Provision { user, name } => {
            render(runtime.block_on(service.provision_on_signup(user, name))?)?
        }
        Command::Create { user, name } => {
            render(runtime.block_on(service.create_group(user, name))?)?
        }
        Command::Join { user, code } => render(runtime.block_on(service.join_group(user, code))?)?,
        Command::Leave { user, group } => {
            render(runtime.block_on(service.leave_group(user, group))?)?
        }
        Command::Invite { user, group } => {
            let invite = runtime.block_on(service.issue_invite(group, user))?;
            render_invite(&invite, Utc::now())?
        }
        Command::Validate { code } => render(runtime.block_on(service.validate_invite(code))?)?,
        Command::Show { user, group } => {
            let details = runtime.block_on(service.run(move |m| match group {
                Some(group) => m.group_details(user, group),
                None => m.current_group(user),
            }))?;
            render(details)?
        }
        Command::Rename { user, group, name } => {
            render(runtime.block_on(service.run(move |m| m.rename_group(user, group, &name)))?)?
        }
        Command::Delete { user, group } => {
            let moved = runtime.block_on(service.run(move |m| m.delete_group(user, group)))?;
            render(moved)?
        }
        Command::PurgeInvites => {
            let purged = runtime.block_on(service.run(|m| m.invitations().purge_expired()))?;
            render(serde_json::json!({ "purged": purged }))?
        }
    };

    runtime
        .shutdown_on_idle()
        .wait()
        .map_err(|()| failure::err_msg("Couldn't shut down the runtime"))?;
    Ok(output)
}

#[derive(Debug, StructOpt)]
#[structopt(raw(setting = "::structopt::clap::AppSettings::ColoredHelp"))]
pub struct Options {
    /// Turns off message output. Passing once prevents logging to syslog. Passing twice or more
    /// disables all logging.
    #[structopt(short = "q", long = "quiet", parse(from_occurrences))]
    quiet: usize,

    /// Increases the verbosity. Default verbosity is warnings and higher to syslog, info and
    /// higher to the console.
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: usize,

    /// The URL of the Postgres database.
    #[structopt(long = "db", env = "DATABASE_URL")]
    pub database_url: String,

    /// The URL the frontend is served at, used to build invite links.
    #[structopt(long = "base-url", env = "BASE_URL", default_value = "http://localhost:3000")]
    pub base_url: String,

    /// How many hours an invite code stays valid.
    #[structopt(long = "invite-ttl-hours", env = "INVITE_TTL_HOURS", default_value = "24")]
    pub invite_ttl_hours: i64,

    /// How many milliseconds a membership change may take before it is rolled back.
    #[structopt(long = "timeout-ms", env = "TRANSITION_TIMEOUT_MS", default_value = "5000")]
    pub timeout_ms: u64,

    /// The syslog server to send logs to.
    #[structopt(short = "s", long = "syslog-server", env = "SYSLOG_SERVER")]
    syslog_server: Option<String>,

    /// What to do.
    #[structopt(subcommand)]
    pub command: Command,
}

/// The operations the CLI can perform.
#[derive(Debug, StructOpt)]
pub enum Command {
    /// Creates a user along with their personal group.
    #[structopt(name = "signup")]
    SignUp {
        /// The user's display name.
        name: String,
    },

    /// Gives an existing user with no group their personal group.
    #[structopt(name = "provision")]
    Provision {
        /// The user's ID.
        user: UserId,
        /// The user's display name.
        name: String,
    },

    /// Creates a group and moves the user into it.
    #[structopt(name = "create")]
    Create {
        /// The user's ID.
        user: UserId,
        /// The group's name.
        name: String,
    },

    /// Moves the user into the group an invite code leads to.
    #[structopt(name = "join")]
    Join {
        /// The user's ID.
        user: UserId,
        /// The invite code.
        code: String,
    },

    /// Moves the user out of a group, into a fresh personal group.
    #[structopt(name = "leave")]
    Leave {
        /// The user's ID.
        user: UserId,
        /// The group's ID.
        group: GroupId,
    },

    /// Issues an invite code for a group.
    #[structopt(name = "invite")]
    Invite {
        /// The ID of the group's owner.
        user: UserId,
        /// The group's ID.
        group: GroupId,
    },

    /// Checks an invite code.
    #[structopt(name = "validate")]
    Validate {
        /// The invite code.
        code: String,
    },

    /// Shows a group and its members; the user's current group by default.
    #[structopt(name = "show")]
    Show {
        /// The user's ID.
        user: UserId,
        /// The group's ID.
        group: Option<GroupId>,
    },

    /// Renames a group.
    #[structopt(name = "rename")]
    Rename {
        /// The ID of the group's owner.
        user: UserId,
        /// The group's ID.
        group: GroupId,
        /// The new name.
        name: String,
    },

    /// Deletes a group, moving its members to personal groups.
    #[structopt(name = "delete")]
    Delete {
        /// The ID of the group's owner.
        user: UserId,
        /// The group's ID.
        group: GroupId,
    },

    /// Deletes all expired invites.
    #[structopt(name = "purge-invites")]
    PurgeInvites,
}

impl Options {
    /// Builds the engine's settings.
    pub fn settings(&self) -> Settings {
        Settings {
            base_url: self.base_url.clone(),
            invite_ttl: ChronoDuration::hours(self.invite_ttl_hours),
            transition_timeout: Duration::from_millis(self.timeout_ms),
        }
    }

    /// Sets up logging as specified by the `-q`, `-s`, and `-v` flags.
    pub fn start_logger(&self) -> Fallible<()> {
        use fern::Dispatch;
        use log::LevelFilter;

        if self.quiet >= 2 {
            return Ok(());
        }

        let (console_ll, syslog_ll) = match self.verbose {
            0 => (LevelFilter::Info, LevelFilter::Warn),
            1 => (LevelFilter::Debug, LevelFilter::Info),
            2 => (LevelFilter::Trace, LevelFilter::Debug),
            _ => (LevelFilter::Trace, LevelFilter::Trace),
        };

        let fern = Dispatch::new().chain(
            Dispatch::new()
                .level(console_ll)
                .format(move |out, message, record| {
                    out.finish(format_args!("[{}] {}", record.level(), message))
                })
                .chain(std::io::stderr()),
        );

        let fern = if self.quiet == 0 {
            let formatter = syslog::Formatter3164 {
                facility: syslog::Facility::LOG_DAEMON,
                hostname: hostname::get_hostname(),
                process: "ledgergroups".to_owned(),
                pid: ::std::process::id() as i32,
            };

            let syslog = if let Some(ref server) = self.syslog_server {
                syslog::tcp(formatter, server).map_err(failure::SyncFailure::new)?
            } else {
                syslog::unix(formatter.clone())
                    .or_else(|_| syslog::tcp(formatter.clone(), ("127.0.0.1", 601)))
                    .or_else(|_| {
                        syslog::udp(formatter.clone(), ("127.0.0.1", 0), ("127.0.0.1", 514))
                    })
                    .map_err(failure::SyncFailure::new)?
            };

            fern.chain(Dispatch::new().level(syslog_ll).chain(syslog))
        } else {
            fern
        };

        fern.apply()?;
        Ok(())
    }
}
