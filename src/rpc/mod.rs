// SPDX-License-Identifier: Apache-2.0

// JSON-RPC over stdio: framing, method routing and the request loop

pub mod codec;
pub mod dispatcher;
pub mod server;

pub use dispatcher::Dispatcher;
pub use server::serve;
