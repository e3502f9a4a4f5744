//! Timed rotation through a list of wallpapers.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::error::{WallpaperError, WallpaperResult};
use crate::media;
use crate::protocol::Compositor;
use crate::request::WallpaperRequest;
use crate::session::SessionController;

/// Loop period while nothing animates.
const IDLE_TICK: Duration = Duration::from_millis(100);
/// Loop period while a transition or animation waits on frame callbacks.
const BUSY_TICK: Duration = Duration::from_millis(4);

/// Supported wallpaper files in `dir`, sorted. Hidden entries are skipped.
pub fn scan_directory(dir: &Path, recursive: bool) -> WallpaperResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect(dir, recursive, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect(dir: &Path, recursive: bool, files: &mut Vec<PathBuf>) -> WallpaperResult<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            if recursive {
                collect(&path, recursive, files)?;
            }
        } else if path.is_file() && media::is_supported(&path) {
            files.push(path);
        }
    }
    Ok(())
}

/// Reads a playlist: one path per line, `#` starts a comment line, and
/// directories contribute their supported files.
pub fn load_playlist(path: &Path) -> WallpaperResult<Vec<PathBuf>> {
    let contents = fs::read_to_string(path).map_err(|err| {
        WallpaperError::configuration(format!("cannot read playlist {}: {err}", path.display()))
    })?;

    let mut files = Vec::new();
    for line in contents.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let entry = Path::new(line);
        if entry.is_file() {
            files.push(entry.to_path_buf());
        } else if entry.is_dir() {
            files.extend(scan_directory(entry, false)?);
        } else {
            warn!("Skipping missing playlist entry: {line}");
        }
    }
    files.sort();
    Ok(files)
}

/// The order in which slideshow files are shown.
pub struct Slideshow<R> {
    files: Vec<PathBuf>,
    interval: Duration,
    random: bool,
    current: usize,
    rng: R,
}

impl<R: Rng> Slideshow<R> {
    /// In random mode the list is shuffled up front and every advance picks a
    /// file other than the current one.
    pub fn new(
        mut files: Vec<PathBuf>,
        interval: Duration,
        random: bool,
        mut rng: R,
    ) -> WallpaperResult<Self> {
        if files.len() < 2 {
            return Err(WallpaperError::invalid(format!(
                "a slideshow needs at least 2 files, got {}",
                files.len()
            )));
        }
        if interval.is_zero() {
            return Err(WallpaperError::invalid("slideshow interval must be positive"));
        }
        if random {
            files.shuffle(&mut rng);
        }
        Ok(Self {
            files,
            interval,
            random,
            current: 0,
            rng,
        })
    }

    pub fn current(&self) -> &Path {
        &self.files[self.current]
    }

    pub fn advance(&mut self) -> &Path {
        self.current = if self.random {
            // Draw from every index but the current one.
            let pick = self.rng.random_range(0..self.files.len() - 1);
            if pick >= self.current { pick + 1 } else { pick }
        } else {
            (self.current + 1) % self.files.len()
        };
        self.current()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_random(&self) -> bool {
        self.random
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

/// Shows the slideshow's current file, then switches every interval until
/// `running` is cleared. Failed switches are logged and the rotation goes on.
pub fn run_slideshow<C, R>(
    session: &mut SessionController<C>,
    slideshow: &mut Slideshow<R>,
    template: &WallpaperRequest,
    running: &AtomicBool,
) -> WallpaperResult<()>
where
    C: Compositor,
    R: Rng,
{
    session.set_wallpaper(&template.with_file(slideshow.current()))?;
    info!(
        files = slideshow.files().len(),
        interval = ?slideshow.interval(),
        random = slideshow.is_random(),
        "Slideshow started"
    );

    let mut next_switch = Instant::now() + slideshow.interval();
    while running.load(Ordering::Relaxed) {
        if Instant::now() >= next_switch {
            let path = slideshow.advance().to_path_buf();
            info!("Switching to: {}", path.display());
            if let Err(err) = session.set_wallpaper(&template.with_file(&path)) {
                warn!("Failed to set wallpaper: {err}");
            }
            next_switch = Instant::now() + slideshow.interval();
        }

        session.dispatch_pending_events()?;
        thread::sleep(if session.is_busy() { BUSY_TICK } else { IDLE_TICK });
    }

    info!("Slideshow stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn paths(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("{i}.png"))).collect()
    }

    #[test]
    fn sequential_order_wraps() {
        let mut show =
            Slideshow::new(paths(3), Duration::from_secs(1), false, StdRng::seed_from_u64(0))
                .unwrap();
        assert_eq!(show.current(), Path::new("0.png"));
        assert_eq!(show.advance(), Path::new("1.png"));
        assert_eq!(show.advance(), Path::new("2.png"));
        assert_eq!(show.advance(), Path::new("0.png"));
    }

    #[test]
    fn random_order_never_repeats_back_to_back() {
        let mut show =
            Slideshow::new(paths(4), Duration::from_secs(1), true, StdRng::seed_from_u64(42))
                .unwrap();
        let mut previous = show.current().to_path_buf();
        for _ in 0..200 {
            let next = show.advance().to_path_buf();
            assert_ne!(next, previous);
            previous = next;
        }
    }

    #[test]
    fn two_files_alternate_in_random_mode() {
        let mut show =
            Slideshow::new(paths(2), Duration::from_secs(1), true, StdRng::seed_from_u64(7))
                .unwrap();
        let first = show.current().to_path_buf();
        let second = show.advance().to_path_buf();
        assert_ne!(first, second);
        assert_eq!(show.advance(), first.as_path());
    }

    #[test]
    fn rejects_short_lists_and_zero_interval() {
        let rng = StdRng::seed_from_u64(0);
        assert!(Slideshow::new(paths(1), Duration::from_secs(1), false, rng.clone()).is_err());
        assert!(Slideshow::new(paths(2), Duration::ZERO, false, rng).is_err());
    }

    #[test]
    fn scan_skips_hidden_and_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.JPG", ".hidden.png", "notes.txt", "loop.gif"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.webp"), b"").unwrap();

        let flat = scan_directory(dir.path(), false).unwrap();
        let names: Vec<_> = flat
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.png", "loop.gif"]);

        let deep = scan_directory(dir.path(), true).unwrap();
        assert_eq!(deep.len(), 4);
    }

    #[test]
    fn playlist_expands_directories_and_skips_comments() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        fs::create_dir(&images).unwrap();
        fs::write(images.join("x.png"), b"").unwrap();
        fs::write(images.join("y.png"), b"").unwrap();
        let single = dir.path().join("single.jpg");
        fs::write(&single, b"").unwrap();

        let playlist = dir.path().join("list.txt");
        fs::write(
            &playlist,
            format!(
                "# favourites\n\n{}\r\n{}\n{}/missing.png\n",
                single.display(),
                images.display(),
                dir.path().display()
            ),
        )
        .unwrap();

        let files = load_playlist(&playlist).unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.contains(&single));
        assert!(files.windows(2).all(|w| w[0] <= w[1]));
    }
}
