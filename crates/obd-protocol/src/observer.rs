//! Observers that decoded responses are published to

use crate::error::DecodeError;
use crate::response::ObdResponse;

/// Receives every decoded response in stream order
pub trait ResponseObserver {
    /// Called once per decoded response
    fn on_response(&mut self, response: &ObdResponse);

    /// Called for every frame that could not be decoded
    fn on_decode_error(&mut self, _error: &DecodeError) {}
}

impl<T: ResponseObserver + ?Sized> ResponseObserver for &mut T {
    fn on_response(&mut self, response: &ObdResponse) {
        (**self).on_response(response);
    }

    fn on_decode_error(&mut self, error: &DecodeError) {
        (**self).on_decode_error(error);
    }
}

impl ResponseObserver for Vec<ObdResponse> {
    fn on_response(&mut self, response: &ObdResponse) {
        self.push(response.clone());
    }
}
