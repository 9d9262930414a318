//! Seams between the account client, the user stream and the network
//!
//! Everything runs on one monoio thread, so the traits are `?Send`.

use crate::errors::Result;
use crate::http::{HttpRequest, HttpResponse};
use crate::types::ListenKey;
use async_trait::async_trait;
use std::rc::Rc;
use url::Url;

/// One HTTP round trip
#[async_trait(?Send)]
pub trait HttpTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Source of user data stream credentials
#[async_trait(?Send)]
pub trait ListenKeyIssuer {
    /// Issue a fresh listen key
    async fn issue_listen_key(&self) -> Result<ListenKey>;

    /// Whether issuing can ever succeed. `false` is a configuration fault.
    fn has_credentials(&self) -> bool;
}

#[async_trait(?Send)]
impl<T: ListenKeyIssuer + ?Sized> ListenKeyIssuer for Rc<T> {
    async fn issue_listen_key(&self) -> Result<ListenKey> {
        (**self).issue_listen_key().await
    }

    fn has_credentials(&self) -> bool {
        (**self).has_credentials()
    }
}

/// Opens push connections
#[async_trait(?Send)]
pub trait StreamConnector {
    type Connection: StreamConnection;

    async fn connect(&self, url: &Url) -> Result<Self::Connection>;
}

/// An open push connection delivering text messages
#[async_trait(?Send)]
pub trait StreamConnection {
    /// Next complete text message. `Ok(None)` means the remote closed.
    async fn next_message(&mut self) -> Result<Option<String>>;

    async fn close(&mut self) -> Result<()>;
}
