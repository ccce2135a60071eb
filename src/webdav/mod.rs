pub mod client;
pub mod transport;
pub mod types;
pub mod xml;

pub use client::WebDavClient;
pub use transport::{DavRequest, DavTransport, HyperTransport, RawResponse};
pub use types::{BatchItem, Depth, HeaderBuilder};
pub use xml::{
    ALL_NAMESPACES, DavResponse, Element, MultistatusResult, NS_APPLE_ICAL, NS_CALDAV, NS_CALENDARSERVER,
    NS_CARDDAV, NS_DAV, Node, PropValue, decode_multistatus, encode_document,
};
