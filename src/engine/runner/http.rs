use std::{net::SocketAddr, thread};

use axum::Router;
use camino::Utf8PathBuf;
use console::style;
use tower_http::services::ServeDir;
use tracing::info;

/// Serves `roots` on `127.0.0.1:port` from a background thread. A request is
/// answered by the first root holding the path, a path found in none of them
/// is a 404.
pub(crate) fn start(roots: Vec<Utf8PathBuf>, port: u16) -> thread::JoinHandle<Result<(), anyhow::Error>> {
    info!(url = %style(format!("http://localhost:{port}/")).yellow(), "starting a HTTP server");

    thread::spawn(move || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(serve(roots, port))
    })
}

async fn serve(roots: Vec<Utf8PathBuf>, port: u16) -> Result<(), anyhow::Error> {
    let address = SocketAddr::from(([127, 0, 0, 1], port));
    let address = tokio::net::TcpListener::bind(address).await?;

    axum::serve(address, router(&roots)).await?;

    Ok(())
}

/// Chains one `ServeDir` per root, each falling back to the next one.
fn router(roots: &[Utf8PathBuf]) -> Router {
    roots.iter().rev().fold(Router::new(), |next, root| {
        Router::new().fallback_service(ServeDir::new(root).fallback(next))
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use axum::body::{self, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    fn get(router: Router, uri: &str) -> (StatusCode, String) {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(async {
                let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
                let response = router.oneshot(request).await.unwrap();
                let status = response.status();
                let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
                (status, String::from_utf8(bytes.to_vec()).unwrap())
            })
    }

    #[test]
    fn test_roots_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let (a, b) = (root.join("a"), root.join("b"));
        fs::create_dir_all(b.join("views")).unwrap();
        fs::create_dir_all(&a).unwrap();
        fs::write(a.join("index.html"), "from a").unwrap();
        fs::write(b.join("index.html"), "from b").unwrap();
        fs::write(b.join("app.js"), "only b").unwrap();
        fs::write(b.join("views/index.html"), "view").unwrap();

        let roots = [a, b];

        assert_eq!(get(router(&roots), "/index.html"), (StatusCode::OK, String::from("from a")));
        assert_eq!(get(router(&roots), "/app.js"), (StatusCode::OK, String::from("only b")));
        assert_eq!(get(router(&roots), "/views/"), (StatusCode::OK, String::from("view")));
        assert_eq!(get(router(&roots), "/missing.js").0, StatusCode::NOT_FOUND);
    }
}
