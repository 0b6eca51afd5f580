use std::time::Duration;

use crate::{
    bson::doc,
    cmap::{Command, RawCommandResponse},
    error::Result,
    operation::{Operation, Retryability, WriteConcernOnlyBody},
    options::{Acknowledgment, WriteConcern},
    sdam::ServerDescription,
};

const RETRY_W_TIMEOUT: Duration = Duration::from_millis(10_000);

pub(crate) struct CommitTransaction {
    write_concern: Option<WriteConcern>,
}

impl CommitTransaction {
    pub(crate) fn new(write_concern: Option<WriteConcern>) -> Self {
        Self { write_concern }
    }
}

impl Operation for CommitTransaction {
    type O = ();

    const NAME: &'static str = "commitTransaction";

    fn build(&mut self, _description: &ServerDescription) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: 1,
        };
        if let Some(write_concern) = self.write_concern.as_ref() {
            if let Some(field) = write_concern.to_command_field()? {
                body.insert("writeConcern", field);
            }
        }

        Ok(Command::new(Self::NAME, "admin", body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &ServerDescription,
    ) -> Result<Self::O> {
        let response: WriteConcernOnlyBody = response.body()?;
        response.validate()
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.write_concern.as_ref()
    }

    fn retryability(&self) -> Retryability {
        Retryability::Write
    }

    fn requires_session(&self) -> bool {
        true
    }

    // A retried commit must not be satisfied by fewer nodes than the attempt that may already have
    // committed, so it waits for a majority.
    fn update_for_retry(&mut self) {
        match &mut self.write_concern {
            Some(write_concern) => {
                write_concern.w = Some(Acknowledgment::Majority);
                if write_concern.w_timeout.is_none() {
                    write_concern.w_timeout = Some(RETRY_W_TIMEOUT);
                }
            }
            None => {
                self.write_concern = Some(
                    WriteConcern::builder()
                        .w(Acknowledgment::Majority)
                        .w_timeout(RETRY_W_TIMEOUT)
                        .build(),
                );
            }
        }
    }
}
