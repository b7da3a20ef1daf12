// Drives the real `ApiClient` against a small HTTP/1.1 server on a loopback
// socket that answers the way the web front-end does.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use itisadb_console::api::{ApiClient, Backend, RemoteError};
use itisadb_console::cookies::SessionCookies;
use itisadb_console::router::{RemoteCall, Resource};
use reqwest::Url;

const SESSION: &str = "session=tok123";

#[derive(Debug, Clone)]
struct Seen {
    method: String,
    target: String,
    cookie: Option<String>,
    body: String,
}

impl Seen {
    fn logged_in(&self) -> bool {
        self.cookie
            .as_deref()
            .is_some_and(|c| c.split("; ").any(|pair| pair == SESSION))
    }
}

fn read_request(stream: &TcpStream) -> std::io::Result<Seen> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut cookie = None;
    let mut length = 0;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header)? == 0 {
            break;
        }
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "cookie" => cookie = Some(value.trim().to_string()),
                "content-length" => length = value.trim().parse().unwrap_or(0),
                _ => {}
            }
        }
    }
    let mut body = vec![0; length];
    reader.read_exact(&mut body)?;

    Ok(Seen {
        method,
        target,
        cookie,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

fn respond(status: u16, extra: &[&str], content_type: &str, body: &str) -> String {
    let mut head = format!("HTTP/1.1 {status} X\r\n");
    for line in extra {
        head.push_str(line);
        head.push_str("\r\n");
    }
    head.push_str(&format!("Content-Type: {content_type}\r\n"));
    head.push_str(&format!("Content-Length: {}\r\n", body.len()));
    head.push_str("Connection: close\r\n\r\n");
    head + body
}

fn text(status: u16, text: &str) -> String {
    let body = serde_json::json!({ "text": text }).to_string();
    respond(status, &[], "application/json", &body)
}

fn redirect(to: &str, set_cookie: Option<&str>) -> String {
    let mut extra = vec![format!("Location: {to}")];
    if let Some(value) = set_cookie {
        extra.push(format!("Set-Cookie: {value}"));
    }
    let extra: Vec<&str> = extra.iter().map(String::as_str).collect();
    respond(302, &extra, "text/plain", "")
}

/// Routes of the web front-end that the console touches.
fn answer(req: &Seen) -> String {
    match (req.method.as_str(), req.target.as_str()) {
        ("POST", "/auth") if req.body == "username=admin&password=secret" => redirect(
            "/",
            Some("session=tok123; Expires=Fri, 01 Jan 2100 00:00:00 GMT; HttpOnly"),
        ),
        ("POST", "/auth") | ("GET", "/auth") => {
            respond(200, &[], "text/html", "<form>log in</form>")
        }
        _ if !req.logged_in() => redirect("/auth", None),
        ("GET", "/") => respond(200, &[], "text/html", "<html>console</html>"),
        ("GET", "/act?action=get%20mykey") => text(200, "value123"),
        ("GET", "/act?action=get%20missing") => text(500, "not found"),
        ("GET", "/act?action=logout") => {
            let expire = "Set-Cookie: session=; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT";
            let body = serde_json::json!({ "text": "bye" }).to_string();
            respond(200, &[expire], "application/json", &body)
        }
        ("GET", "/servers") => respond(502, &[], "text/plain", "Bad Gateway\n"),
        ("GET", "/history") => respond(200, &[], "text/html", "<html>"),
        _ => respond(404, &[], "text/plain", "404 page not found"),
    }
}

struct FrontEnd {
    addr: SocketAddr,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl FrontEnd {
    fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else {
                    continue;
                };
                let Ok(request) = read_request(&stream) else {
                    continue;
                };
                let response = answer(&request);
                log.lock().unwrap().push(request);
                let _ = stream.write_all(response.as_bytes());
            }
        });

        FrontEnd { addr, seen }
    }

    fn url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).unwrap()
    }

    fn client(&self, cookies: Arc<SessionCookies>) -> ApiClient {
        ApiClient::new(self.url(), Duration::from_secs(5), cookies).unwrap()
    }

    fn last(&self) -> Seen {
        self.seen.lock().unwrap().last().cloned().unwrap()
    }
}

#[test]
fn login_cookie_is_sent_back_on_calls() {
    let front = FrontEnd::start();
    let cookies = Arc::new(SessionCookies::new());
    let api = front.client(cookies.clone());

    api.login("admin", "secret").unwrap();
    assert!(cookies.has_session());

    let answer = api.fetch(&RemoteCall::act("get mykey"));
    assert_eq!(answer, Ok("value123".to_string()));
    let last = front.last();
    assert_eq!(last.target, "/act?action=get%20mykey");
    assert_eq!(last.cookie.as_deref(), Some(SESSION));
}

#[test]
fn wrong_password_fails_login() {
    let front = FrontEnd::start();
    let cookies = Arc::new(SessionCookies::new());
    let api = front.client(cookies.clone());

    let err = api.login("admin", "nope").unwrap_err();
    assert!(err.to_string().starts_with("Login failed"));
    assert!(!cookies.has_session());
}

#[test]
fn redirect_to_login_page_means_unauthenticated() {
    let front = FrontEnd::start();
    let api = front.client(Arc::new(SessionCookies::new()));

    assert_eq!(
        api.fetch(&RemoteCall::act("get mykey")),
        Err(RemoteError::Unauthenticated)
    );
    assert_eq!(front.last().target, "/auth");
}

#[test]
fn error_statuses_arrive_as_remote_errors() {
    let front = FrontEnd::start();
    let api = front.client(Arc::new(SessionCookies::new()));
    api.login("admin", "secret").unwrap();

    assert_eq!(
        api.fetch(&RemoteCall::act("get missing")),
        Err(RemoteError::Status {
            status: 500,
            text: "not found".into()
        })
    );
    assert_eq!(
        api.fetch(&RemoteCall::named(Resource::Servers)),
        Err(RemoteError::Status {
            status: 502,
            text: "Bad Gateway".into()
        })
    );
    assert!(matches!(
        api.fetch(&RemoteCall::named(Resource::History)),
        Err(RemoteError::Decode(_))
    ));
}

#[test]
fn server_can_expire_the_session() {
    let front = FrontEnd::start();
    let cookies = Arc::new(SessionCookies::new());
    let api = front.client(cookies.clone());
    api.login("admin", "secret").unwrap();

    assert_eq!(api.fetch(&RemoteCall::act("logout")), Ok("bye".to_string()));
    assert!(!cookies.has_session());
    assert_eq!(
        api.fetch(&RemoteCall::act("get mykey")),
        Err(RemoteError::Unauthenticated)
    );
}

#[test]
fn expired_cookies_are_not_sent() {
    let front = FrontEnd::start();
    let cookies = Arc::new(SessionCookies::new());
    let api = front.client(cookies.clone());
    api.login("admin", "secret").unwrap();

    cookies.expire_all();
    assert_eq!(
        api.fetch(&RemoteCall::act("get mykey")),
        Err(RemoteError::Unauthenticated)
    );
}

#[test]
fn saved_session_works_in_a_new_client() {
    let front = FrontEnd::start();
    let dir = tempfile::tempdir().unwrap();
    let session_file = dir.path().join("session");

    let first = Arc::new(SessionCookies::new());
    front.client(first.clone()).login("admin", "secret").unwrap();
    first.persist(&session_file).unwrap();

    let second = Arc::new(SessionCookies::new());
    second.restore(&session_file).unwrap();
    let api = front.client(second);
    assert_eq!(
        api.fetch(&RemoteCall::act("get mykey")),
        Ok("value123".to_string())
    );
}

#[test]
fn unreachable_front_end_is_a_transport_error() {
    let addr = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let api = ApiClient::new(
        Url::parse(&format!("http://{addr}")).unwrap(),
        Duration::from_secs(5),
        Arc::new(SessionCookies::new()),
    )
    .unwrap();

    assert!(matches!(
        api.fetch(&RemoteCall::named(Resource::History)),
        Err(RemoteError::Transport(_))
    ));
}
