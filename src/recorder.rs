//! Response metadata capture.

use std::io;

use http::{HeaderName, HeaderValue, StatusCode};

use crate::error::Error;
use crate::response::ResponseSink;

/// Wraps the request's [`ResponseSink`] and remembers what went through it.
///
/// Wire behaviour is unchanged: every call is forwarded as-is. The recorder
/// only adds two observations middleware can read after the rest of the chain
/// ran: the last status set and the number of body bytes the sink accepted.
///
/// One recorder exists per request, created by
/// [`MiddlewareChain::execute`](crate::MiddlewareChain::execute).
pub struct ResponseRecorder<'s> {
    sink: &'s mut dyn ResponseSink,
    status: StatusCode,
    bytes_written: usize,
}

impl<'s> ResponseRecorder<'s> {
    pub fn new(sink: &'s mut dyn ResponseSink) -> Self {
        Self { sink, status: StatusCode::OK, bytes_written: 0 }
    }

    /// Records `status` and forwards it to the sink.
    ///
    /// The recorded value always follows the last call, even when the sink
    /// ignores a status sent after the body started.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
        self.sink.send_status(status);
    }

    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.sink.append_header(name, value);
    }

    /// Forwards `buf` to the sink and counts the accepted bytes.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        let n = self.sink.write(buf).map_err(Error::WriteFailed)?;
        self.bytes_written += n;
        Ok(n)
    }

    /// Writes all of `buf`, looping over short writes.
    pub fn write_all(&mut self, mut buf: &[u8]) -> Result<(), Error> {
        while !buf.is_empty() {
            match self.write(buf)? {
                0 => {
                    return Err(Error::WriteFailed(io::Error::from(io::ErrorKind::WriteZero)));
                }
                n => buf = &buf[n..],
            }
        }
        Ok(())
    }

    /// Asks the sink to discard everything written so far. On success the
    /// recorder starts over too: status 200, no bytes.
    pub fn reset(&mut self) -> bool {
        if !self.sink.reset() {
            return false;
        }
        self.status = StatusCode::OK;
        self.bytes_written = 0;
        true
    }

    pub fn status(&self) -> StatusCode { self.status }

    /// Body bytes accepted by the sink so far.
    pub fn content_length(&self) -> usize { self.bytes_written }
}

/// A recorder is itself a sink, so a nested [`MiddlewareChain`] used as a
/// route handler records into the outer chain's recorder.
///
/// [`MiddlewareChain`]: crate::MiddlewareChain
impl ResponseSink for ResponseRecorder<'_> {
    fn send_status(&mut self, status: StatusCode) {
        self.set_status(status);
    }

    fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        ResponseRecorder::append_header(self, name, value);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.sink.write(buf)?;
        self.bytes_written += n;
        Ok(n)
    }

    fn reset(&mut self) -> bool {
        ResponseRecorder::reset(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Response;

    /// Accepts at most `limit` bytes per write, then fails once `budget` is spent.
    struct ChokingSink {
        limit: usize,
        budget: usize,
    }

    impl ResponseSink for ChokingSink {
        fn send_status(&mut self, _: StatusCode) {}
        fn append_header(&mut self, _: HeaderName, _: HeaderValue) {}
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"));
            }
            let n = buf.len().min(self.limit).min(self.budget);
            self.budget -= n;
            Ok(n)
        }
    }

    #[test]
    fn status_defaults_to_200() {
        let mut sink = Response::new();
        let rec = ResponseRecorder::new(&mut sink);
        assert_eq!(rec.status(), StatusCode::OK);
        assert_eq!(rec.content_length(), 0);
    }

    #[test]
    fn content_length_sums_all_writes() {
        let mut sink = Response::new();
        let mut rec = ResponseRecorder::new(&mut sink);
        let chunks: [&[u8]; 4] = [b"a", b"", b"hello", b"0123456789"];
        for chunk in chunks {
            rec.write(chunk).unwrap();
        }
        assert_eq!(rec.content_length(), 16);
        drop(rec);
        assert_eq!(sink.body(), b"ahello0123456789");
    }

    #[test]
    fn status_tracks_last_set_even_when_sink_ignores_it() {
        let mut sink = Response::new();
        let mut rec = ResponseRecorder::new(&mut sink);
        rec.set_status(StatusCode::NOT_FOUND);
        rec.write(b"x").unwrap();
        rec.set_status(StatusCode::BAD_GATEWAY);
        assert_eq!(rec.status(), StatusCode::BAD_GATEWAY);
        drop(rec);
        assert_eq!(sink.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn reset_clears_sink_and_observations() {
        let mut sink = Response::new();
        let mut rec = ResponseRecorder::new(&mut sink);
        rec.set_status(StatusCode::CREATED);
        rec.write_all(b"half").unwrap();

        assert!(rec.reset());
        assert_eq!((rec.status(), rec.content_length()), (StatusCode::OK, 0));
        rec.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        drop(rec);
        assert_eq!(sink.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(sink.body().is_empty());
    }

    #[test]
    fn reset_refused_by_streaming_sink() {
        let mut sink = ChokingSink { limit: 8, budget: 100 };
        let mut rec = ResponseRecorder::new(&mut sink);
        rec.write_all(b"sent").unwrap();
        assert!(!rec.reset());
        assert_eq!(rec.content_length(), 4);
    }

    #[test]
    fn partial_writes_count_only_accepted_bytes() {
        let mut sink = ChokingSink { limit: 3, budget: 100 };
        let mut rec = ResponseRecorder::new(&mut sink);
        assert_eq!(rec.write(b"abcdef").unwrap(), 3);
        assert_eq!(rec.content_length(), 3);
        rec.write_all(b"abcdef").unwrap();
        assert_eq!(rec.content_length(), 9);
    }

    #[test]
    fn sink_error_surfaces_as_write_failed() {
        let mut sink = ChokingSink { limit: 8, budget: 4 };
        let mut rec = ResponseRecorder::new(&mut sink);
        let err = rec.write_all(b"too long for the sink").unwrap_err();
        assert!(matches!(err, Error::WriteFailed(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
        assert_eq!(rec.content_length(), 4);
    }
}
