//! Administrative reset of a ballot held in MongoDB: deletes every vote and
//! clears every voter's has-voted flag in one transaction. Voters, admins and
//! face references are kept.

use clap::{Arg, ArgAction, ArgMatches, Command};
use rocket::tokio::runtime;

use secure_ballot::model::{mongodb::MongoStore, store::BallotLedger};

const PROGRAM_NAME: &str = "ballot-reset";

const ABOUT_TEXT: &str = "Reset a ballot: delete every vote and let every voter vote again.

EXIT CODES:
     0: Reset succeeded.
     1: Error; nothing was changed.
     2: Refused to run without --yes.";

const DB_URI: &str = "DB_URI";
const DB_NAME: &str = "DB_NAME";
const YES: &str = "YES";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .arg(
            Arg::new(DB_URI)
                .long("db-uri")
                .help("MongoDB connection string; the deployment must be a replica set")
                .action(ArgAction::Set)
                .required(true),
        )
        .arg(
            Arg::new(DB_NAME)
                .long("db-name")
                .help("Database holding the ballot")
                .action(ArgAction::Set)
                .default_value("ballot"),
        )
        .arg(
            Arg::new(YES)
                .long("yes")
                .help("Confirm that every vote should be deleted")
                .action(ArgAction::SetTrue),
        )
}

/// Run the reset, report the result, and return the exit code.
fn run(args: &ArgMatches) -> u8 {
    if !args.get_flag(YES) {
        println!("This deletes every vote. Re-run with --yes to confirm.");
        return 2;
    }
    // Both are guaranteed present: one is required, the other defaulted.
    let (Some(uri), Some(name)) = (
        args.get_one::<String>(DB_URI),
        args.get_one::<String>(DB_NAME),
    ) else {
        return 1;
    };

    let runtime = match runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            println!("Failed to start runtime: {e}");
            return 1;
        }
    };
    let result = runtime.block_on(async {
        match MongoStore::connect(uri, name).await {
            Ok(store) => store.reset().await,
            Err(e) => Err(e),
        }
    });
    match result {
        Ok(summary) => {
            println!(
                "Reset '{name}': deleted {} vote(s), reopened {} voter(s).",
                summary.votes_deleted, summary.voters_reset
            );
            0
        }
        Err(e) => {
            println!("Reset failed: {e}");
            1
        }
    }
}

fn main() {
    let args = cli().get_matches();
    let exit_code = run(&args);
    std::process::exit(exit_code.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parsing() {
        let args = cli()
            .try_get_matches_from(["ballot-reset", "--db-uri", "mongodb://localhost"])
            .unwrap();
        assert_eq!(args.get_one::<String>(DB_NAME).unwrap(), "ballot");
        assert!(!args.get_flag(YES));

        let args = cli()
            .try_get_matches_from([
                "ballot-reset",
                "--db-uri",
                "mongodb://localhost",
                "--db-name",
                "mayoral",
                "--yes",
            ])
            .unwrap();
        assert_eq!(args.get_one::<String>(DB_NAME).unwrap(), "mayoral");
        assert!(args.get_flag(YES));
    }

    #[test]
    fn cli_errors() {
        cli().try_get_matches_from(["ballot-reset"]).unwrap_err();
        cli()
            .try_get_matches_from(["ballot-reset", "--db-uri"])
            .unwrap_err();
    }

    #[test]
    fn refuses_without_confirmation() {
        let args = cli()
            .try_get_matches_from(["ballot-reset", "--db-uri", "mongodb://localhost"])
            .unwrap();
        assert_eq!(run(&args), 2);
    }
}
