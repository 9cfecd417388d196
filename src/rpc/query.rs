//! Request/response state machines and the transport driving them.

use std::time::Duration;

use tracing::trace;

use crate::common::{Id, SeekRequest, SeekResponse};

/// A state machine emitting [SeekRequest]s and consuming their responses.
///
/// Every request returned from [Query::next] has to be resolved by exactly one
/// call to either [Query::handle] or [Query::handle_no_response], otherwise its
/// pending entry is never cleared.
pub trait Query {
    /// Returns the next node to ask and the request to send it, or `None` when
    /// there is nothing left to ask.
    fn next(&mut self) -> Option<(Id, SeekRequest)>;

    /// Handle a response, returns `false` if it wasn't expected.
    fn handle(&mut self, response: SeekResponse) -> bool;

    /// Handle a request that got no response in time.
    fn handle_no_response(&mut self, request_id: &[u8]);
}

/// Point to point delivery of [SeekRequest]s.
pub trait Transport {
    /// Send `request` to the node `to` and block until its response arrives,
    /// or return `None` after `timeout`.
    fn send(&self, to: &Id, request: &SeekRequest, timeout: Duration) -> Option<SeekResponse>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send(&self, to: &Id, request: &SeekRequest, timeout: Duration) -> Option<SeekResponse> {
        (**self).send(to, request, timeout)
    }
}

/// Run `query` to completion over `transport`, one request at a time.
///
/// Returns the number of requests sent.
pub fn drive<Q, T>(query: &mut Q, transport: &T, timeout: Duration) -> usize
where
    Q: Query + ?Sized,
    T: Transport + ?Sized,
{
    let mut sent = 0;

    while let Some((to, request)) = query.next() {
        sent += 1;

        match transport.send(&to, &request, timeout) {
            Some(response) if response.id == request.id => {
                query.handle(response);
            }
            Some(response) => {
                trace!(?to, expected = ?request.id, got = ?response.id, "Response to a different request");
                query.handle_no_response(&request.id);
            }
            None => {
                trace!(?to, "No response");
                query.handle_no_response(&request.id);
            }
        }
    }

    sent
}
