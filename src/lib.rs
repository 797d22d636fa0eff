//! # HTTP exchange handle protocol
//!
//! This crate implements the handle-based request/response lifecycle found
//! at a proxy component boundary: callers build requests, attach bodies and
//! dispatch exchanges through opaque, typed handles into an [`HttpCtx`],
//! which owns every resource in an arena table. The wire work itself is
//! delegated to a [`Client`] (by default [`hyper`] over [`tokio`]).
//!
//! The protocol has two sides:
//!
//! * **Client**: create a header collection, build an outgoing request,
//!   optionally write a body, [`send`](HttpCtx::send) it, await the
//!   resulting future, then read status, headers and body off the incoming
//!   response. Every handle is released exactly once.
//! * **Server**: a [`Handler`] receives an inbound request handle plus a
//!   write-once [`ResponseOutparam`]; it builds a response, binds it with
//!   [`set_response_outparam`](HttpCtx::set_response_outparam), and streams
//!   the body through a writer handle. [`serve`] adapts handlers to an
//!   HTTP/1.1 connection loop.
//!
//! A complete client exchange:
//!
//! ```no_run
//! use http_exchange::{HttpCtx, Method, Scheme};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut ctx = HttpCtx::new();
//!     let headers = ctx.new_fields([("user-agent", "WASI-HTTP/0.0.1")])?;
//!     let request = ctx.new_outgoing_request(
//!         Method::Get,
//!         Scheme::Http,
//!         "example.test",
//!         "/get",
//!         "?some=arg&goes=here",
//!         headers,
//!     )?;
//!     let future = ctx.send(request, None)?;
//!     let response = ctx.await_response(future).await?;
//!     println!("STATUS: {}", ctx.response_status(response)?);
//!     let body = ctx.response_consume(response)?;
//!     loop {
//!         let (chunk, end_of_stream) = ctx.stream_read(body, 64 * 1024).await?;
//!         print!("{}", String::from_utf8_lossy(&chunk));
//!         if end_of_stream {
//!             break;
//!         }
//!     }
//!     ctx.drop_outgoing_request(request)?;
//!     ctx.drop_input_stream(body)?;
//!     ctx.drop_incoming_response(response)?;
//!     ctx.drop_future_response(future)?;
//!     Ok(())
//! }
//! ```

mod body;
mod client;
mod ctx;
mod error;
mod fields;
mod future;
pub mod io;
mod request;
mod response;
mod serve;
mod table;
mod types;

pub use body::{BodyReader, BodyWriter, ChannelBody};
pub use client::{Client, DefaultClient};
pub use ctx::HttpCtx;
pub use error::{
    AlreadyConsumedError, AlreadySetError, BuildError, ExchangeError, StreamError,
    UseAfterReleaseError,
};
pub use fields::Fields;
pub use future::FutureResponse;
pub use request::{IncomingRequest, OutgoingRequest};
pub use response::{IncomingResponse, OutgoingResponse, OutparamResult, ResponseOutparam};
pub use serve::{serve, Handler};
pub use table::Handle;
pub use types::{Method, RequestOptions, Scheme};
