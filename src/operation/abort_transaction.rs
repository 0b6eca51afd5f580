use crate::{
    bson::doc,
    cmap::{Command, RawCommandResponse},
    error::Result,
    operation::{Operation, Retryability, WriteConcernOnlyBody},
    options::WriteConcern,
    sdam::ServerDescription,
};

pub(crate) struct AbortTransaction {
    write_concern: Option<WriteConcern>,
}

impl AbortTransaction {
    pub(crate) fn new(write_concern: Option<WriteConcern>) -> Self {
        Self { write_concern }
    }
}

impl Operation for AbortTransaction {
    type O = ();

    const NAME: &'static str = "abortTransaction";

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
}
