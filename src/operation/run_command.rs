use crate::{
    bson::Document,
    bson_util::first_key,
    cmap::{Command, RawCommandResponse},
    error::{Error, Result},
    sdam::ServerDescription,
    selection_criteria::SelectionCriteria,
};

use super::Operation;

/// Commands that can't be associated with a session.
const SESSIONS_UNSUPPORTED_COMMANDS: [&str; 5] = [
    "killcursors",
    "parallelcollectionscan",
    "hello",
    "ismaster",
    "getnonce",
];

/// An arbitrary command supplied by the caller. It is sent exactly once.
#[derive(Debug, Clone)]
pub(crate) struct RunCommand {
    db: String,
    command: Document,
    selection_criteria: Option<SelectionCriteria>,
}

impl RunCommand {
    pub(crate) fn new(
        db: String,
        command: Document,
        selection_criteria: Option<SelectionCriteria>,
    ) -> Result<Self> {
        if command.is_empty() {
            return Err(Error::invalid_argument(
                "an empty document cannot be passed to a run_command operation",
            ));
        }

        Ok(Self {
            db,
            command,
            selection_criteria,
        })
    }

    fn command_name(&self) -> &str {
        first_key(&self.command).unwrap_or_default()
    }
}

impl Operation for RunCommand {
    type O = Document;

    // Since we can't actually specify a string statically here, we just put a descriptive string
    // that should fail loudly if accidentally passed to the server.
    const NAME: &'static str = "$genericRunCommand";

    fn build(&mut self, _description: &ServerDescription) -> Result<Command> {
        Ok(Command::new(
            self.command_name(),
            self.db.clone(),
            self.command.clone(),
        ))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &ServerDescription,
    ) -> Result<Self::O> {
        Ok(response.raw_body().clone())
    }

    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        self.selection_criteria.as_ref()
    }

    fn supports_sessions(&self) -> bool {
        !SESSIONS_UNSUPPORTED_COMMANDS.contains(&self.command_name().to_lowercase().as_str())
    }

    fn name(&self) -> &str {
        self.command_name()
    }
}
