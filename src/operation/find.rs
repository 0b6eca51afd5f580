use serde::Deserialize;

use crate::{
    bson::{doc, Document},
    cmap::{Command, RawCommandResponse},
    error::{Error, Result},
    operation::{append_options, Operation, Retryability},
    options::FindOptions,
    sdam::ServerDescription,
    selection_criteria::SelectionCriteria,
    Namespace,
};

/// A `find` whose results are read from the first batch of the cursor the server opens.
#[derive(Debug)]
pub(crate) struct Find {
    ns: Namespace,
    filter: Document,
    options: Option<FindOptions>,
}

impl Find {
    pub(crate) fn new(ns: Namespace, filter: Document, options: Option<FindOptions>) -> Self {
        Self {
            ns,
            filter,
            options,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FindResponseBody {
    cursor: CursorInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CursorInfo {
    first_batch: Vec<Document>,
}

impl Operation for Find {
    type O = Vec<Document>;

    const NAME: &'static str = "find";

    fn build(&mut self, description: &ServerDescription) -> Result<Command> {
        if self
            .options
            .as_ref()
            .is_some_and(|options| options.collation.is_some())
            && !description.supports_collation()
        {
            return Err(Error::incompatible_server(format!(
                "the server at {} does not support collation",
                description.address()
            )));
        }

        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "filter": self.filter.clone(),
        };
        append_options(&mut body, self.options.as_ref())?;

        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &ServerDescription,
    ) -> Result<Self::O> {
        let body: FindResponseBody = response.body()?;
        Ok(body.cursor.first_batch)
    }

    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        self.options
            .as_ref()
            .and_then(|options| options.selection_criteria.as_ref())
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }
}
