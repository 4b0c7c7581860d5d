use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use crate::server::AppState;

/// Upload files with a multipart POST, download them again from /download.
#[derive(Debug, Clone, Parser)]
#[command(name = "filedrop", version, about)]
pub struct Config {
    /// Directory uploads are written to and downloads are served from.
    #[arg(default_value = "./uploads")]
    pub dir: PathBuf,

    /// Port to listen on.
    #[arg(env = "PORT", default_value_t = 8001)]
    pub port: u16,

    /// Address to bind.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Answer /download with 404 instead of a directory listing.
    #[arg(long)]
    pub no_list: bool,

    /// Never negotiate brotli, even when the client accepts it.
    #[arg(long)]
    pub no_brotli: bool,
}

impl Config {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn state(&self) -> AppState {
        AppState {
            dir: Arc::new(self.dir.clone()),
            list_files: !self.no_list,
            brotli: !self.no_brotli,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use clap::Parser;

    use super::Config;

    #[test]
    fn test_positional_arguments() {
        let config = Config::try_parse_from(["filedrop", "/srv/drop", "9000"]).unwrap();
        assert_eq!(Path::new("/srv/drop"), config.dir);
        assert_eq!(9000, config.port);
        assert_eq!("0.0.0.0:9000", config.addr().to_string());

        let state = config.state();
        assert!(state.list_files);
        assert!(state.brotli);
    }

    #[test]
    fn test_flags() {
        let config = Config::try_parse_from(["filedrop", "--no-list", "--no-brotli", "--bind", "127.0.0.1", "d", "1"]).unwrap();
        let state = config.state();
        assert!(!state.list_files);
        assert!(!state.brotli);
        assert_eq!("127.0.0.1:1", config.addr().to_string());
    }

    #[test]
    fn test_default_dir() {
        let config = Config::try_parse_from(["filedrop"]).unwrap();
        assert_eq!(Path::new("./uploads"), config.dir);
    }

    #[test]
    fn test_invalid_port() {
        assert!(Config::try_parse_from(["filedrop", "d", "not-a-port"]).is_err());
    }
}
