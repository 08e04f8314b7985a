use std::{
    ffi::OsString,
    fs::{remove_file, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::mpsc,
    thread,
};

use chrono::{DateTime, Utc};
use flate2::{write::GzEncoder, Compression};

/// Writes fix records into hourly JSON-lines files, `<root>/<date>/<date><hour>0000.json`.
///
/// With compression on, each file is gzipped in the background once the
/// store moves on to the next hour.
#[derive(Debug)]
pub struct FixStore {
    root_dir: PathBuf,
    last_date: Option<String>,
    last_hour: Option<String>,
    current: Option<(PathBuf, File)>,
    compress_tx: Option<mpsc::Sender<PathBuf>>,
    compress_hdl: Option<thread::JoinHandle<()>>,
}

impl Drop for FixStore {
    fn drop(&mut self) {
        // closing the channel stops the compression thread once its queue is empty
        self.compress_tx.take();
        if let Some(hdl) = self.compress_hdl.take() {
            let _ = hdl.join();
        }
    }
}

impl FixStore {
    /// Create the store under `root_dir`
    pub fn new(root_dir: PathBuf, compress: bool) -> Result<Self, io::Error> {
        std::fs::create_dir_all(&root_dir)?;
        let (compress_tx, compress_hdl) = if compress {
            let (tx, rx) = mpsc::channel::<PathBuf>();
            let hdl = thread::spawn(move || {
                log::info!("Compression thread started");
                while let Ok(path) = rx.recv() {
                    match compress_file(&path) {
                        Ok(out) => log::info!("Compressed {path:?} to {out:?}"),
                        Err(e) => log::warn!("Compression error {e:?}: {path:?}"),
                    }
                }
                log::info!("Compression thread exiting");
            });
            (Some(tx), Some(hdl))
        } else {
            (None, None)
        };
        Ok(Self {
            root_dir,
            last_date: None,
            last_hour: None,
            current: None,
            compress_tx,
            compress_hdl,
        })
    }

    /// Append one record, filed by `tstamp`
    pub fn store(&mut self, tstamp: DateTime<Utc>, record: &[u8]) -> Result<(), io::Error> {
        let date = tstamp.format("%Y%m%d").to_string();
        let hour = tstamp.format("%H").to_string();
        if self.last_date.as_deref() != Some(&date) || self.last_hour.as_deref() != Some(&hour) {
            self.rotate(&date, &hour)?;
        }
        match &mut self.current {
            Some((_, writer)) => {
                writer.write_all(record)?;
                writer.write_all(b"\n")?;
                writer.flush()
            }
            None => Err(io::Error::new(io::ErrorKind::Other, "No file writer")),
        }
    }

    fn rotate(&mut self, date: &str, hour: &str) -> Result<(), io::Error> {
        if let Some((path, _)) = self.current.take() {
            if let Some(tx) = &self.compress_tx {
                if let Err(mpsc::SendError(path)) = tx.send(path) {
                    log::warn!("Compression thread is gone, leaving {path:?} uncompressed");
                }
            }
        }
        let dir = self.root_dir.join(date);
        std::fs::create_dir_all(&dir)?;
        let filename = dir.join(format!("{date}{hour}0000.json"));
        let writer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&filename)?;
        self.current = Some((filename, writer));
        self.last_date = Some(date.to_string());
        self.last_hour = Some(hour.to_string());
        Ok(())
    }
}

fn compress_file(path: &Path) -> Result<PathBuf, io::Error> {
    let mut outfile = OsString::from(path.as_os_str());
    outfile.push(".gz");
    let outfile = PathBuf::from(outfile);
    let mut input = File::open(path)?;
    let mut encoder = GzEncoder::new(File::create(&outfile)?, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;
    remove_file(path)?;
    Ok(outfile)
}
