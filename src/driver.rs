// Interactive import flow: credentials, group, file, import. Each step is
// gated on the one before; setup problems abort the run with a dialog and
// anything unexpected is reported once at the top.

use crate::config::Config;
use crate::import::{add_rois_from_csv, ImportReport};
use crate::session::{Connector, GroupSession};
use crate::ui::{Level, Prompter};
use anyhow::{Context, Result};

pub const REQUIRED_COLUMNS_HELP: &str = "The CSV file must contain the following columns depending on the ROI type:\n\n\
- rectangle: image_id, type, X, Y, Width, Height, text (optional)\n\
- polygon: image_id, type, X_points, Y_points, text (optional)\n\
- ellipse: image_id, type, X, Y, Width, Height, text (optional)\n\
- line: image_id, type, X1, Y1, X2, Y2, text (optional)\n\n\
Make sure your file is correctly formatted before continuing.";

/// How a run ended.
#[derive(Debug)]
pub enum Outcome {
    Completed(ImportReport),
    /// Stopped at a setup step (missing input, bad group, no file).
    Aborted,
    /// An unexpected error; already shown to the user.
    Failed(anyhow::Error),
}

/// Run the whole flow. Never leaves a session open.
pub fn run<P: Prompter, C: Connector>(prompter: &mut P, connector: &C, config: &Config) -> Outcome {
    match try_run(prompter, connector, config) {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("run failed: {e:#}");
            prompter.notify(Level::Error, "Error", &format!("An error occurred: {e:#}"));
            Outcome::Failed(e)
        }
    }
}

fn try_run<P: Prompter, C: Connector>(prompter: &mut P, connector: &C, config: &Config) -> Result<Outcome> {
    let host = prompter.ask_text("Host", config.default_host.as_deref())?;
    let username = prompter.ask_text("Username", None)?;
    let password = prompter.ask_password("Password")?;

    let (host, username, password) = match (host, username, password) {
        (Some(h), Some(u), Some(p)) => (h, u, p),
        _ => {
            prompter.notify(Level::Warning, "Input Error", "All fields are required.");
            return Ok(Outcome::Aborted);
        }
    };

    let mut session = connector.connect(host.trim(), username.trim(), &password)?;
    let outcome = with_session(prompter, &mut session);
    session.close();
    outcome
}

fn with_session<P: Prompter, S: GroupSession>(prompter: &mut P, session: &mut S) -> Result<Outcome> {
    let groups = session.list_groups().context("Failed to list groups")?;
    let prompt = format!(
        "Available groups:\n{}\n\nEnter the ID of the group",
        groups.listing()
    );
    let (group_id, group_name) = match prompter.ask_integer(&prompt)? {
        Some(id) if groups.contains(id) => (id, groups.name(id).unwrap_or_default().to_string()),
        _ => {
            prompter.notify(Level::Error, "Error", "Invalid group ID.");
            return Ok(Outcome::Aborted);
        }
    };
    session.switch_group(group_id)?;
    tracing::info!("importing into group {group_name} ({group_id})");

    prompter.notify(Level::Info, "CSV Requirements", REQUIRED_COLUMNS_HELP);

    let path = match prompter.pick_csv_file("Select CSV File")? {
        Some(path) => path,
        None => {
            prompter.notify(Level::Warning, "Input Error", "A CSV file must be selected.");
            return Ok(Outcome::Aborted);
        }
    };

    let report = add_rois_from_csv(&*session, &path)?;
    prompter.notify(
        Level::Info,
        "Success",
        &format!(
            "ROIs processed for all images in {}.\n{}",
            path.display(),
            report.summary()
        ),
    );
    Ok(Outcome::Completed(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Groups, RoiTarget};
    use crate::shapes::Shape;
    use crate::ui::scripted::{Answer, ScriptedPrompter};
    use std::cell::{Cell, RefCell};
    use std::io::Write;
    use std::path::PathBuf;
    use std::rc::Rc;

    /// Shared view of what the fake session saw, kept after the session
    /// itself is dropped.
    #[derive(Default)]
    struct SessionLog {
        closes: Cell<usize>,
        switched_to: Cell<Option<i64>>,
        posted: RefCell<Vec<(i64, Shape)>>,
    }

    struct FakeSession {
        log: Rc<SessionLog>,
        fail_list_groups: bool,
    }

    impl RoiTarget for FakeSession {
        fn post_roi(&self, image_id: i64, shape: &Shape) -> Result<i64> {
            self.log.posted.borrow_mut().push((image_id, shape.clone()));
            Ok(1)
        }
    }

    impl GroupSession for FakeSession {
        fn list_groups(&self) -> Result<Groups> {
            if self.fail_list_groups {
                anyhow::bail!("group list failed: 500 Internal Server Error");
            }
            Ok(Groups::new([(3, "lab".to_string()), (53, "imaging".to_string())]))
        }

        fn switch_group(&mut self, group_id: i64) -> Result<()> {
            self.log.switched_to.set(Some(group_id));
            Ok(())
        }

        fn close(&mut self) {
            self.log.closes.set(self.log.closes.get() + 1);
        }
    }

    #[derive(Default)]
    struct FakeConnector {
        log: Rc<SessionLog>,
        refuse: bool,
        fail_list_groups: bool,
        connects: Cell<usize>,
    }

    impl Connector for FakeConnector {
        type Session = FakeSession;

        fn connect(&self, _host: &str, _username: &str, _password: &str) -> Result<FakeSession> {
            self.connects.set(self.connects.get() + 1);
            if self.refuse {
                anyhow::bail!("Failed to connect to the OMERO server");
            }
            Ok(FakeSession {
                log: self.log.clone(),
                fail_list_groups: self.fail_list_groups,
            })
        }
    }

    fn text(s: &str) -> Answer {
        Answer::Text(Some(s.to_string()))
    }

    fn credentials() -> Vec<Answer> {
        vec![text("omero.example.org"), text("ana"), text("secret")]
    }

    fn csv_file(dir: &tempfile::TempDir) -> Result<PathBuf> {
        let path = dir.path().join("rois.csv");
        let mut file = std::fs::File::create(&path)?;
        writeln!(file, "image_id,type,X,Y,Width,Height,X_points,Y_points")?;
        writeln!(file, "5,rectangle,1,2,3,4,,")?;
        writeln!(file, "6,polygon,,,,,\"1,2,3\",\"4,5\"")?;
        Ok(path)
    }

    fn last_notification(prompter: &ScriptedPrompter) -> (Level, String, String) {
        prompter.notifications.last().cloned().unwrap()
    }

    #[test]
    fn completes_and_closes_session_once() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = csv_file(&dir)?;
        let mut answers = credentials();
        answers.push(Answer::Integer(Some(53)));
        answers.push(Answer::File(Some(path)));
        let mut prompter = ScriptedPrompter::new(answers);
        let connector = FakeConnector::default();

        let outcome = run(&mut prompter, &connector, &Config::default());

        let report = match outcome {
            Outcome::Completed(report) => report,
            other => panic!("expected completion, got {other:?}"),
        };
        assert_eq!(report.submitted.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(connector.log.posted.borrow().len(), 1);
        assert_eq!(connector.log.switched_to.get(), Some(53));
        assert_eq!(connector.log.closes.get(), 1);

        assert!(prompter.prompts[3].contains("ID: 3 - lab\nID: 53 - imaging"));
        assert!(prompter
            .notifications
            .iter()
            .any(|(_, title, msg)| title == "CSV Requirements" && msg == REQUIRED_COLUMNS_HELP));
        let (level, title, _) = last_notification(&prompter);
        assert_eq!((level, title.as_str()), (Level::Info, "Success"));
        Ok(())
    }

    #[test]
    fn empty_credential_aborts_without_connecting() {
        let mut prompter = ScriptedPrompter::new([
            text("omero.example.org"),
            Answer::Text(Some("  ".into())),
            text("secret"),
        ]);
        let connector = FakeConnector::default();

        let outcome = run(&mut prompter, &connector, &Config::default());

        assert!(matches!(outcome, Outcome::Aborted));
        assert_eq!(connector.connects.get(), 0);
        let (level, _, msg) = last_notification(&prompter);
        assert_eq!(level, Level::Warning);
        assert_eq!(msg, "All fields are required.");
    }

    #[test]
    fn refused_connection_is_reported() {
        let mut prompter = ScriptedPrompter::new(credentials());
        let connector = FakeConnector {
            refuse: true,
            ..Default::default()
        };

        let outcome = run(&mut prompter, &connector, &Config::default());

        assert!(matches!(outcome, Outcome::Failed(_)));
        assert_eq!(connector.log.closes.get(), 0);
        let (level, _, msg) = last_notification(&prompter);
        assert_eq!(level, Level::Error);
        assert!(msg.contains("Failed to connect"));
    }

    #[test]
    fn unknown_group_aborts_before_file_selection() {
        let mut answers = credentials();
        answers.push(Answer::Integer(Some(99)));
        let mut prompter = ScriptedPrompter::new(answers);
        let connector = FakeConnector::default();

        let outcome = run(&mut prompter, &connector, &Config::default());

        assert!(matches!(outcome, Outcome::Aborted));
        assert_eq!(connector.log.switched_to.get(), None);
        assert!(connector.log.posted.borrow().is_empty());
        assert_eq!(connector.log.closes.get(), 1);
        // Credentials and the group prompt only; no file picker.
        assert_eq!(prompter.prompts.len(), 4);
        let (level, _, msg) = last_notification(&prompter);
        assert_eq!((level, msg.as_str()), (Level::Error, "Invalid group ID."));
    }

    #[test]
    fn cancelled_group_prompt_aborts() {
        let mut answers = credentials();
        answers.push(Answer::Integer(None));
        let mut prompter = ScriptedPrompter::new(answers);
        let connector = FakeConnector::default();

        assert!(matches!(
            run(&mut prompter, &connector, &Config::default()),
            Outcome::Aborted
        ));
        assert_eq!(connector.log.closes.get(), 1);
    }

    #[test]
    fn no_file_selected_aborts_and_closes() {
        let mut answers = credentials();
        answers.push(Answer::Integer(Some(3)));
        answers.push(Answer::File(None));
        let mut prompter = ScriptedPrompter::new(answers);
        let connector = FakeConnector::default();

        let outcome = run(&mut prompter, &connector, &Config::default());

        assert!(matches!(outcome, Outcome::Aborted));
        assert_eq!(connector.log.switched_to.get(), Some(3));
        assert_eq!(connector.log.closes.get(), 1);
        let (level, _, msg) = last_notification(&prompter);
        assert_eq!((level, msg.as_str()), (Level::Warning, "A CSV file must be selected."));
    }

    #[test]
    fn unexpected_error_is_shown_and_session_closed_once() {
        let mut prompter = ScriptedPrompter::new(credentials());
        let connector = FakeConnector {
            fail_list_groups: true,
            ..Default::default()
        };

        let outcome = run(&mut prompter, &connector, &Config::default());

        assert!(matches!(outcome, Outcome::Failed(_)));
        assert_eq!(connector.log.closes.get(), 1);
        let (level, title, msg) = last_notification(&prompter);
        assert_eq!((level, title.as_str()), (Level::Error, "Error"));
        assert!(msg.starts_with("An error occurred:"));
        assert!(msg.contains("500"));
    }

    #[test]
    fn unreadable_file_fails_and_closes_session_once() {
        let mut answers = credentials();
        answers.push(Answer::Integer(Some(3)));
        answers.push(Answer::File(Some(PathBuf::from("/nonexistent/rois.csv"))));
        let mut prompter = ScriptedPrompter::new(answers);
        let connector = FakeConnector::default();

        let outcome = run(&mut prompter, &connector, &Config::default());

        assert!(matches!(outcome, Outcome::Failed(_)));
        assert_eq!(connector.log.closes.get(), 1);
    }
}
