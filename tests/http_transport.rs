use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use league_feed::error::SyncError;
use league_feed::http_client::build_http_client;
use league_feed::models::{Collection, Team};
use league_feed::store::decode_list;
use league_feed::transport::{ApiRequest, HttpTransport, Transport, server_message};

/// Serves one canned response and hands back the raw request it received.
fn serve_once(status: &str, body: &str, delay: Duration) -> (String, thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind local port");
    let addr = listener.local_addr().expect("local addr");
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let request = read_request(&mut stream);
        thread::sleep(delay);
        let _ = stream.write_all(response.as_bytes());
        request
    });
    (format!("http://{addr}"), handle)
}

fn read_request(stream: &mut TcpStream) -> String {
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout");
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn transport(base_url: &str, timeout: Duration) -> HttpTransport {
    let client = build_http_client(timeout).expect("client should build");
    HttpTransport::with_client(client, base_url)
}

#[test]
fn list_hits_collection_path() {
    let body = r#"[{"id":1,"nome":"UD Songo","posicao":1,"jogos":1,"vitorias":1,"empates":0,"derrotas":0,"gols_pro":2,"gols_contra":0}]"#;
    let (base, server) = serve_once("200 OK", body, Duration::ZERO);
    let http = transport(&base, Duration::from_secs(5));

    let value = http
        .send(&ApiRequest::List(Collection::Teams))
        .expect("list should succeed");
    let teams = decode_list::<Team>(value).expect("teams should decode");
    assert_eq!(teams[0].name, "UD Songo");

    let request = server.join().expect("server thread");
    assert!(request.starts_with("GET /equipes HTTP/1.1"));
}

#[test]
fn error_body_message_is_surfaced() {
    let (base, server) = serve_once("404 Not Found", r#"{"error":"Record not found"}"#, Duration::ZERO);
    let http = transport(&base, Duration::from_secs(5));

    let err = http
        .send(&ApiRequest::Delete {
            collection: Collection::Articles,
            id: 77,
        })
        .expect_err("404 should fail");
    assert_eq!(err, SyncError::server(404, "Record not found"));

    let request = server.join().expect("server thread");
    assert!(request.starts_with("DELETE /artigos/77 HTTP/1.1"));
}

#[test]
fn create_sends_json_body() {
    let (base, server) = serve_once(
        "201 Created",
        r#"{"message":"Team created","id":15}"#,
        Duration::ZERO,
    );
    let http = transport(&base, Duration::from_secs(5));

    let value = http
        .send(&ApiRequest::Create {
            collection: Collection::Teams,
            body: serde_json::json!({"nome": "Chibuto"}),
        })
        .expect("create should succeed");
    assert_eq!(value["id"], 15);

    let request = server.join().expect("server thread");
    assert!(request.starts_with("POST /equipes HTTP/1.1"));
    assert!(request.contains(r#"{"nome":"Chibuto"}"#));
}

#[test]
fn refused_connection_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind local port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    let http = transport(&format!("http://{addr}"), Duration::from_secs(2));

    let err = http
        .send(&ApiRequest::List(Collection::Results))
        .expect_err("nothing is listening");
    assert!(matches!(err, SyncError::Network { timed_out: false, .. }));
}

#[test]
fn slow_server_times_out() {
    let (base, server) = serve_once("200 OK", "[]", Duration::from_millis(1500));
    let http = transport(&base, Duration::from_millis(300));

    let err = http
        .send(&ApiRequest::List(Collection::Articles))
        .expect_err("response arrives too late");
    assert!(matches!(err, SyncError::Network { timed_out: true, .. }));
    let _ = server.join();
}

#[test]
fn server_message_prefers_json_fields() {
    assert_eq!(
        server_message(r#"{"error":"Incomplete data"}"#),
        Some("Incomplete data".to_string())
    );
    assert_eq!(
        server_message(r#"{"message":"Email already registered"}"#),
        Some("Email already registered".to_string())
    );
    assert_eq!(server_message(r#"{"status":"fail"}"#), None);
    assert_eq!(server_message("<html><body>502</body></html>"), None);
    assert_eq!(server_message("  database locked \n"), Some("database locked".to_string()));
    assert_eq!(server_message(""), None);
}
