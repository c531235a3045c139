#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use flate2::Compression;
use flate2::write::GzEncoder;

pub const CSV_HEADER: &str = "ID,M/F,Hand,Age,Educ,SES,MMSE,CDR,eTIV,nWBV,ASF,Delay";

pub fn covariates_csv(subjects: impl IntoIterator<Item = u16>) -> String {
    let mut csv = String::from(CSV_HEADER);
    csv.push('\n');
    for subject in subjects {
        csv.push_str(&format!(
            "OAS1_{subject:04}_MR1,F,R,{},2,3,29,0,1344,0.743,1.306,N/A\n",
            60 + subject
        ));
    }
    csv
}

pub fn tgz(members: &[(String, Vec<u8>)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::fast());
    let mut builder = tar::Builder::new(encoder);
    for (name, content) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, name, content.as_slice())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn map_member(prefix: &str, subject: u16) -> String {
    format!("OAS1_{subject:04}_MR1/{prefix}OAS1_{subject:04}_MR1_mpr_anon_fslswapdim_bet.nii.gz")
}

/// Requests seen by the mirror as `path` or `path|range`.
pub type Hits = Arc<Mutex<Vec<String>>>;

/// Serves `files` over plain HTTP/1.1 on a loopback port, honouring
/// `Range: bytes=N-` requests. Returns the base URL and the request log.
pub fn serve(files: HashMap<String, Vec<u8>>) -> (String, Hits) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let hits: Hits = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&hits);
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            handle(stream, &files, &log);
        }
    });
    (format!("http://{addr}/mirror"), hits)
}

fn handle(mut stream: TcpStream, files: &HashMap<String, Vec<u8>>, hits: &Hits) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();
    let mut range_start: Option<usize> = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':')
            && name.eq_ignore_ascii_case("range")
        {
            range_start = value
                .trim()
                .strip_prefix("bytes=")
                .and_then(|rest| rest.strip_suffix('-'))
                .and_then(|start| start.parse().ok());
        }
    }

    let name = path.trim_start_matches("/mirror/").to_string();
    hits.lock().unwrap().push(match range_start {
        Some(start) => format!("{name}|bytes={start}-"),
        None => name.clone(),
    });

    let (head, body): (String, &[u8]) = match (files.get(&name), range_start) {
        (None, _) => ("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n".to_string(), b"".as_slice()),
        (Some(content), Some(start)) if start >= content.len() => (
            format!(
                "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nContent-Length: 0\r\n",
                content.len()
            ),
            b"".as_slice(),
        ),
        (Some(content), Some(start)) => (
            format!(
                "HTTP/1.1 206 Partial Content\r\nContent-Range: bytes {start}-{}/{}\r\nContent-Length: {}\r\n",
                content.len() - 1,
                content.len(),
                content.len() - start
            ),
            &content[start..],
        ),
        (Some(content), None) => (
            format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n", content.len()),
            content.as_slice(),
        ),
    };
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(b"Connection: close\r\n\r\n");
    let _ = stream.write_all(body);
    let _ = stream.flush();
}
