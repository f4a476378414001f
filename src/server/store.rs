use std::sync::Arc;

use tracing::debug;

use crate::common::{
    Contact, ResponseSpecific, StoreRequestArguments, StoreResponseArguments, StoreStatus,
    StoreStatusCode,
};
use crate::server::tokens::TokenError;
use crate::stats::Counter;

use super::{Context, RequestHandler};

#[derive(Debug)]
/// Stores the values of requesters holding a valid security token.
pub struct StoreRequestHandler {
    context: Arc<Context>,
}

impl StoreRequestHandler {
    pub fn new(context: Arc<Context>) -> Self {
        StoreRequestHandler { context }
    }
}

impl RequestHandler for StoreRequestHandler {
    type Arguments = StoreRequestArguments;

    fn handle_request(
        &self,
        requester: &Contact,
        arguments: StoreRequestArguments,
    ) -> Option<ResponseSpecific> {
        let context = &self.context;
        context.stats.increment(Counter::StoreRequests);

        if let Err(error) = context
            .tokens
            .validate(requester, arguments.token.as_deref())
        {
            debug!(
                requester = ?requester.key,
                from = ?requester.observed_address(),
                ?error,
                request_type = "store",
                "Invalid token"
            );

            context.stats.increment(match error {
                TokenError::Missing => Counter::StoreMissingToken,
                TokenError::Invalid => Counter::StoreBadToken,
            });

            return None;
        }

        let statuses = arguments
            .values
            .into_iter()
            .map(|value| {
                let primary_key = value.primary_key;
                let secondary_key = value.secondary_key();

                let stored = if context.config.store_requires_closest
                    && !context
                        .routing
                        .is_among_closest(&primary_key, context.config.k)
                {
                    debug!(?primary_key, "Not among the closest nodes to key");
                    false
                } else {
                    context.database.store(value)
                };

                context.stats.increment(if stored {
                    Counter::StoredValues
                } else {
                    Counter::RejectedValues
                });

                StoreStatus {
                    primary_key,
                    secondary_key,
                    code: if stored {
                        StoreStatusCode::Succeeded
                    } else {
                        StoreStatusCode::Failed
                    },
                }
            })
            .collect();

        Some(ResponseSpecific::Store(StoreResponseArguments { statuses }))
    }
}
