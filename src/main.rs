//! A minimal demonstration binary: parse a URL, connect, GET it, print the
//! response body. The interactive REPL/IPC surface implied by spec.md §6 is
//! out of scope here (spec.md §1) — this binary only exercises the library.

use clap::{crate_version, App, Arg};
use http2::Client;
use url::Url;

#[tokio::main]
async fn main() {
    env_logger::init();

    let matches = App::new("http2")
        .version(crate_version!())
        .arg(Arg::with_name("url").required(true).index(1))
        .get_matches();
    let url = Url::parse(matches.value_of("url").expect("missing url")).expect("invalid url");
    let host = url.host_str().expect("url has no host");
    let port = url.port_or_known_default().unwrap_or(443);

    let client = match Client::connect_with_port(host, port).await {
        Ok(client) => client,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    match client.get(url.path().to_owned()).await {
        Ok(response) => println!("{}", String::from_utf8_lossy(&response.body)),
        Err(err) => eprintln!("{err}"),
    }
}
