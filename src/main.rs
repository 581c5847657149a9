use std::{
    error::Error,
    io::{self, BufRead},
    path::PathBuf,
    sync::Arc,
};

use clap::{Args, Parser, Subcommand};
use log::{error, info};
use openshock_clock::{
    alarm::{default_name, parse_time_of_day, DEFAULT_DURATION_MS, DEFAULT_INTENSITY},
    config::{Paths, Settings},
    countdown::{self, Countdown},
    credentials::{CredentialStore, Credentials},
    daemon::{self, ClockHandle, LocalTime, TimeSource},
    error::{AlarmError, StoreError},
    sink::HttpSink,
    Alarm, AlarmClock, AlarmStore, Alarms, Dispatch,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// directory holding config.toml and the credentials file
    #[clap(long, global = true)]
    config_dir: Option<PathBuf>,
    /// directory holding alarms.toml
    #[clap(long, global = true)]
    data_dir: Option<PathBuf>,
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// write a default config file
    Init {
        #[clap(long, short)]
        force: bool,
    },
    /// add an alarm, replacing any alarm with the same name
    Add(NewAlarm),
    /// delete an alarm
    Remove(AlarmName),
    /// show every alarm and the time left until it goes off
    List,
    /// save the api key and shocker id
    Settings(SettingsArgs),
    /// run the alarm clock (the default)
    Run,
}

/// Commands understood on stdin while the clock is running.
#[derive(Parser)]
#[command(no_binary_name = true)]
struct Line {
    #[clap(subcommand)]
    command: LineCommand,
}

#[derive(Subcommand)]
enum LineCommand {
    Add(NewAlarm),
    Remove(AlarmName),
    List,
    Settings(SettingsArgs),
    Quit,
}

#[derive(Args, Debug, Clone)]
struct NewAlarm {
    /// time of day, HH:MM
    time: String,
    /// may be several words, `Alarm <n>` if left out
    #[clap(long, short, num_args = 1..)]
    name: Vec<String>,
    /// 0 to 100
    #[clap(long, short, default_value_t = i64::from(DEFAULT_INTENSITY))]
    intensity: i64,
    /// in milliseconds
    #[clap(long, short, default_value_t = i64::from(DEFAULT_DURATION_MS))]
    duration: i64,
    /// vibrate 30 seconds before the alarm goes off
    #[clap(long, short)]
    vibrate_before: bool,
}

/// Alarm names may contain spaces, so every remaining word is part of it.
#[derive(Args, Debug, Clone)]
struct AlarmName {
    #[clap(required = true, num_args = 1..)]
    name: Vec<String>,
}

impl AlarmName {
    fn joined(&self) -> String {
        self.name.join(" ")
    }
}

#[derive(Args, Debug, Clone)]
struct SettingsArgs {
    #[clap(long)]
    api_key: Option<String>,
    #[clap(long)]
    shock_id: Option<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    // initilize the logger
    simple_file_logger::init_logger!("openshock_clock")?;

    let cli = Cli::parse();
    let paths = Paths::resolve(cli.config_dir, cli.data_dir)?;
    let store = AlarmStore::new(paths.alarms_file());
    let credential_store = CredentialStore::new(paths.credentials_file());
    let now = LocalTime.now();

    match cli.command.unwrap_or(Command::Run) {
        Command::Init { force } => {
            if force || !paths.is_config_present() {
                Settings::new().save(&paths.settings_file())?;
                println!("wrote {}", paths.settings_file().display());
            } else {
                println!(
                    "{} already exists, use --force to overwrite it",
                    paths.settings_file().display()
                );
            }
        }
        Command::Add(new_alarm) => {
            let alarms = store.load(now);
            let (name, alarm) = build_alarm(&new_alarm, &alarms, now)?;
            store.save(&name, &alarm)?;
            println!("{}", countdown_for(name, &alarm, now));
        }
        Command::Remove(name) => {
            let name = name.joined();
            store.delete(&name)?;
            println!("removed {name}");
        }
        Command::List => {
            let credentials = credential_store.load();
            println!("{}", status(&credentials));
            for (name, alarm) in store.refresh(now) {
                println!("{}", countdown_for(name, &alarm, now));
            }
        }
        Command::Settings(args) => {
            let credentials = save_settings(&credential_store, args)?;
            println!("{}", status(&credentials));
        }
        Command::Run => run(&paths, store, &credential_store)?,
    }
    Ok(())
}

fn run(
    paths: &Paths,
    store: AlarmStore,
    credential_store: &CredentialStore,
) -> Result<(), Box<dyn Error>> {
    let settings = Settings::load(&paths.settings_file())?;
    let credentials = credential_store.load();
    println!("{}", status(&credentials));

    let sink = HttpSink::new(
        &settings.api_endpoint,
        &settings.custom_name,
        settings.request_timeout(),
    )?;
    let alarms = store.load(LocalTime.now());
    let clock = AlarmClock::new(alarms, store, Arc::new(sink), credentials, Dispatch::Detached);
    let handle = daemon::spawn(clock, settings.tick_interval(), LocalTime)?;
    info!("OpenShockClock started");
    print_countdowns(&handle);

    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match Line::try_parse_from(line.split_whitespace()) {
            Ok(Line { command }) => {
                if !handle_line(command, &handle, credential_store) {
                    break;
                }
            }
            Err(e) => {
                let _ = e.print();
            }
        }
    }

    handle.shutdown();
    Ok(())
}

// returns false when the clock should stop
fn handle_line(
    command: LineCommand,
    handle: &ClockHandle,
    credential_store: &CredentialStore,
) -> bool {
    match command {
        LineCommand::Add(new_alarm) => {
            let Some(alarms) = handle.snapshot() else {
                return false;
            };
            let now = LocalTime.now();
            match build_alarm(&new_alarm, &alarms, now) {
                Ok((name, alarm)) => {
                    println!("{}", countdown_for(name.clone(), &alarm, now));
                    handle.add_alarm(name, alarm);
                }
                Err(e) => println!("{e}"),
            }
        }
        LineCommand::Remove(name) => {
            handle.remove_alarm(name.joined());
        }
        LineCommand::List => print_countdowns(handle),
        LineCommand::Settings(args) => match save_settings(credential_store, args) {
            Ok(credentials) => {
                println!("{}", status(&credentials));
                handle.update_credentials(credentials);
            }
            Err(e) => {
                error!("error saving settings: {e}");
                println!("couldn't save settings: {e}");
            }
        },
        LineCommand::Quit => return false,
    }
    true
}

fn build_alarm(
    new_alarm: &NewAlarm,
    alarms: &Alarms,
    now: chrono::NaiveDateTime,
) -> Result<(String, Alarm), AlarmError> {
    let time = parse_time_of_day(&new_alarm.time)?;
    let alarm = Alarm::at_time_of_day(
        time,
        now,
        new_alarm.intensity,
        new_alarm.duration,
        new_alarm.vibrate_before,
    )?;
    let name = new_alarm.name.join(" ");
    let name = match name.trim() {
        "" => default_name(alarms),
        name => name.to_string(),
    };
    Ok((name, alarm))
}

fn save_settings(
    credential_store: &CredentialStore,
    args: SettingsArgs,
) -> Result<Credentials, StoreError> {
    let mut credentials = credential_store.load();
    if let Some(api_key) = args.api_key {
        credentials.api_key = api_key;
    }
    if let Some(shock_id) = args.shock_id {
        credentials.shock_id = shock_id;
    }
    credential_store.save(&credentials)?;
    Ok(credentials)
}

fn countdown_for(name: String, alarm: &Alarm, now: chrono::NaiveDateTime) -> Countdown {
    let projection = countdown::project(alarm, now);
    Countdown {
        name,
        alarm: projection.rolled.unwrap_or(*alarm),
        remaining: projection.remaining,
    }
}

fn print_countdowns(handle: &ClockHandle) {
    for countdown in handle.countdowns().unwrap_or_default() {
        println!("{countdown}");
    }
}

fn status(credentials: &Credentials) -> &'static str {
    if credentials.is_connected() {
        "Connected"
    } else {
        "Not Connected"
    }
}
