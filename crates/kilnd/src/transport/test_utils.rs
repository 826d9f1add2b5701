//! Test helpers for the transport module.

use std::net::SocketAddr;

use reqwest::Method;
use reqwest::blocking::Client;
use serde_json::Value;

fn send(method: Method, addr: SocketAddr, path: &str) -> reqwest::blocking::Response {
    Client::new()
        .request(method, format!("http://{addr}{path}"))
        .send()
        .expect("request should complete")
}

fn json_reply(response: reqwest::blocking::Response) -> (u16, Value) {
    let status = response.status().as_u16();
    let body = response.text().expect("read response body");
    let body = serde_json::from_str(&body).expect("body should be JSON");
    (status, body)
}

/// Issues a `GET` and returns the status code and the JSON body.
pub(crate) fn http_get(addr: SocketAddr, path: &str) -> (u16, Value) {
    json_reply(send(Method::GET, addr, path))
}

/// Issues a `POST` with an empty body and returns the status code and the
/// JSON body.
pub(crate) fn http_post(addr: SocketAddr, path: &str) -> (u16, Value) {
    json_reply(send(Method::POST, addr, path))
}

/// Status code of a request whose body is not inspected.
pub(crate) fn http_status(method: Method, addr: SocketAddr, path: &str) -> u16 {
    send(method, addr, path).status().as_u16()
}
