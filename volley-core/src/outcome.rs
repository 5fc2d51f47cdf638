use std::time::Duration;

use hyper::StatusCode;

use crate::error::RequestError;

/// What a backend reports for one completed exchange.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Completed {
    pub status: StatusCode,
    pub bytes_read: u64,
}

/// The result of one request attempt, recorded and then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    pub latency: Duration,
    pub result: Result<Completed, RequestError>,
}

impl RequestOutcome {
    #[inline]
    #[must_use]
    pub fn new(latency: Duration, result: Result<Completed, RequestError>) -> Self {
        Self { latency, result }
    }

    #[inline]
    #[must_use]
    pub fn ok(latency: Duration, status: StatusCode, bytes_read: u64) -> Self {
        Self::new(latency, Ok(Completed { status, bytes_read }))
    }

    #[inline]
    #[must_use]
    pub fn failed(latency: Duration, err: RequestError) -> Self {
        Self::new(latency, Err(err))
    }
}

/// Response class by leading status digit; anything outside 1xx-5xx is `Other`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StatusClass {
    Informational,
    Success,
    Redirect,
    ClientError,
    ServerError,
    Other,
}

impl StatusClass {
    pub const COUNT: usize = 6;

    #[must_use]
    pub fn of(status: StatusCode) -> Self {
        match status.as_u16() {
            100..=199 => StatusClass::Informational,
            200..=299 => StatusClass::Success,
            300..=399 => StatusClass::Redirect,
            400..=499 => StatusClass::ClientError,
            500..=599 => StatusClass::ServerError,
            _ => StatusClass::Other,
        }
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_status_codes() {
        assert_eq!(StatusClass::of(StatusCode::CONTINUE), StatusClass::Informational);
        assert_eq!(StatusClass::of(StatusCode::OK), StatusClass::Success);
        assert_eq!(StatusClass::of(StatusCode::NO_CONTENT), StatusClass::Success);
        assert_eq!(StatusClass::of(StatusCode::FOUND), StatusClass::Redirect);
        assert_eq!(StatusClass::of(StatusCode::NOT_FOUND), StatusClass::ClientError);
        assert_eq!(
            StatusClass::of(StatusCode::SERVICE_UNAVAILABLE),
            StatusClass::ServerError
        );
        let odd = StatusCode::from_u16(699).unwrap();
        assert_eq!(StatusClass::of(odd), StatusClass::Other);
    }

    #[test]
    fn indices_are_dense() {
        let all = [
            StatusClass::Informational,
            StatusClass::Success,
            StatusClass::Redirect,
            StatusClass::ClientError,
            StatusClass::ServerError,
            StatusClass::Other,
        ];
        for (i, class) in all.into_iter().enumerate() {
            assert_eq!(class.index(), i);
        }
        assert_eq!(all.len(), StatusClass::COUNT);
    }
}
