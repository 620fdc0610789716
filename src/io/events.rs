use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind};
use std::path::PathBuf;

/// Filesystem change on a watched directory, reduced to what watchers act on.
#[derive(Debug, Clone, PartialEq)]
pub enum FsEvent {
    /// A new entry appeared, either created in place or moved in.
    Created { path: PathBuf, is_dir: bool },
    Modified(PathBuf),
    Removed(PathBuf),
    Error(String),
}

impl FsEvent {
    pub fn from_notify(event: Event) -> Option<FsEvent> {
        match event.kind {
            EventKind::Create(kind) => {
                let path = event.paths.into_iter().next()?;
                let is_dir = matches!(kind, CreateKind::Folder) || path.is_dir();
                Some(FsEvent::Created { path, is_dir })
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                let path = event.paths.into_iter().next()?;
                let is_dir = path.is_dir();
                Some(FsEvent::Created { path, is_dir })
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                // [from, to]; the destination is what arrived.
                let path = event.paths.into_iter().nth(1)?;
                let is_dir = path.is_dir();
                Some(FsEvent::Created { path, is_dir })
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) | EventKind::Remove(_) => {
                Some(FsEvent::Removed(event.paths.into_iter().next()?))
            }
            EventKind::Modify(_) => Some(FsEvent::Modified(event.paths.into_iter().next()?)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, DataChange, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut ev = Event::new(kind);
        for p in paths {
            ev = ev.add_path(PathBuf::from(p));
        }
        ev
    }

    #[test]
    fn create_file_and_folder() {
        assert_eq!(
            FsEvent::from_notify(event(EventKind::Create(CreateKind::File), &["/w/a.pdf"])),
            Some(FsEvent::Created {
                path: "/w/a.pdf".into(),
                is_dir: false
            })
        );
        assert_eq!(
            FsEvent::from_notify(event(EventKind::Create(CreateKind::Folder), &["/w/sub"])),
            Some(FsEvent::Created {
                path: "/w/sub".into(),
                is_dir: true
            })
        );
    }

    #[test]
    fn move_in_counts_as_created() {
        let to = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            &["/w/notes.txt"],
        );
        assert!(matches!(
            FsEvent::from_notify(to),
            Some(FsEvent::Created { ref path, .. }) if path == &PathBuf::from("/w/notes.txt")
        ));

        let both = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/w/draft.part", "/w/final.pdf"],
        );
        assert!(matches!(
            FsEvent::from_notify(both),
            Some(FsEvent::Created { ref path, .. }) if path == &PathBuf::from("/w/final.pdf")
        ));
    }

    #[test]
    fn edits_and_removals() {
        assert_eq!(
            FsEvent::from_notify(event(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                &["/w/a.pdf"]
            )),
            Some(FsEvent::Modified("/w/a.pdf".into()))
        );
        assert_eq!(
            FsEvent::from_notify(event(EventKind::Remove(RemoveKind::File), &["/w/a.pdf"])),
            Some(FsEvent::Removed("/w/a.pdf".into()))
        );
        assert_eq!(
            FsEvent::from_notify(event(EventKind::Access(AccessKind::Read), &["/w/a.pdf"])),
            None
        );
    }
}
