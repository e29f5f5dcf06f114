use tracing::{error, warn};

use crate::communication::{InferenceRequest, InferenceResponse};
use crate::error::ServingError;
use crate::frontend::Frontend;

/// One response slot per request of a cycle.
///
/// A slot is emptied the moment its response is sent, successfully or with
/// an error; nothing is ever written to an empty slot again.
pub struct ResponseLedger<'f, F: Frontend + ?Sized> {
    frontend: &'f F,
    slots: Vec<Option<InferenceResponse>>,
}

impl<'f, F: Frontend + ?Sized> ResponseLedger<'f, F> {
    /// Open a response for every request.
    ///
    /// A response the front-end fails to create leaves its slot empty and
    /// the cycle carries on for everyone else. Null requests get no slot.
    pub fn open(frontend: &'f F, requests: &[Option<InferenceRequest>]) -> Self {
        let slots = requests
            .iter()
            .enumerate()
            .map(|(index, request)| {
                let request = request.as_ref()?;
                match frontend.create_response(request) {
                    Ok(response) => Some(response),
                    Err(err) => {
                        error!(request = index, error = %err, "failed to create response");
                        None
                    }
                }
            })
            .collect();
        Self { frontend, slots }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_open(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// The open response of request `index`, if any.
    pub fn response_mut(&mut self, index: usize) -> Option<&mut InferenceResponse> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    /// Send `err` on request `index` and empty its slot. Empty slots are
    /// left alone.
    pub fn fail(&mut self, index: usize, err: ServingError) {
        if let Some(response) = self.slots.get_mut(index).and_then(Option::take) {
            if let Err(send_err) = self.frontend.send_error(response, err) {
                warn!(request = index, error = %send_err, "failed to send error response");
            }
        }
    }

    /// Send `err` on every open slot.
    pub fn fail_all(&mut self, err: &ServingError) {
        for index in 0..self.slots.len() {
            self.fail(index, err.clone());
        }
    }

    /// Send every response still open and report which requests succeeded.
    pub fn finish(self) -> Vec<bool> {
        self.slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| match slot {
                Some(response) => {
                    if let Err(err) = self.frontend.send_response(response) {
                        warn!(request = index, error = %err, "failed to send response");
                    }
                    true
                }
                None => false,
            })
            .collect()
    }
}
