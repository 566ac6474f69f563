//! Whether a transfer changes who can see the files, and what to tell the
//! user before it does.

use smallvec::{SmallVec, smallvec};

/// Sharing state on both ends of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSharing<'a> {
    /// Shared drive the sources live in.
    pub source_shared_drive: Option<&'a str>,
    pub destination_shared_drive: Option<&'a str>,
    /// Display name of the destination directory.
    pub destination_name: &'a str,
    /// The destination is shared with other people.
    pub destination_shared: bool,
    pub is_move: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfirmationType {
    None,
    MoveBetweenSharedDrives,
    MoveFromSharedDriveToOther,
    MoveFromOtherToSharedDrive,
    CopyToSharedDrive,
    MoveToShared,
    CopyToShared,
}

impl ConfirmationType {
    pub fn classify(sharing: &TransferSharing<'_>) -> Self {
        let source = sharing.source_shared_drive;
        let destination = sharing.destination_shared_drive;

        if sharing.is_move {
            match (source, destination) {
                (Some(s), Some(d)) if s == d => return Self::None,
                (Some(_), Some(_)) => return Self::MoveBetweenSharedDrives,
                (Some(_), None) => return Self::MoveFromSharedDriveToOther,
                (None, Some(_)) => return Self::MoveFromOtherToSharedDrive,
                (None, None) => {}
            }
        } else if let Some(d) = destination
            && source != Some(d)
        {
            return Self::CopyToSharedDrive;
        }

        match (sharing.destination_shared, sharing.is_move) {
            (true, true) => Self::MoveToShared,
            (true, false) => Self::CopyToShared,
            (false, _) => Self::None,
        }
    }

    pub const fn needs_confirmation(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Warning lines shown in the confirmation dialog.
    pub fn messages(self, sharing: &TransferSharing<'_>) -> SmallVec<[String; 2]> {
        let source = sharing.source_shared_drive.unwrap_or_default();
        let destination = sharing.destination_shared_drive.unwrap_or_default();
        match self {
            Self::None => SmallVec::new(),
            Self::MoveBetweenSharedDrives => smallvec![
                format!("Members of '{source}' will lose access to these items."),
                format!("Members of '{destination}' will gain access to these items."),
            ],
            Self::MoveFromSharedDriveToOther => smallvec![format!(
                "Members of '{source}' will lose access to these items."
            )],
            Self::MoveFromOtherToSharedDrive => smallvec![format!(
                "Members of '{destination}' will gain access to these items."
            )],
            Self::CopyToSharedDrive => smallvec![format!(
                "Members of '{destination}' will gain access to the copies of these items."
            )],
            Self::MoveToShared | Self::CopyToShared => smallvec![format!(
                "'{}' is shared. Everyone who can see it will be able to see these items.",
                sharing.destination_name
            )],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sharing<'a>(source: Option<&'a str>, destination: Option<&'a str>, is_move: bool) -> TransferSharing<'a> {
        TransferSharing {
            source_shared_drive: source,
            destination_shared_drive: destination,
            destination_name: "Target",
            destination_shared: false,
            is_move,
        }
    }

    #[test]
    fn test_moves_between_shared_drives() {
        let within = sharing(Some("Design"), Some("Design"), true);
        let between = sharing(Some("Design"), Some("Legal"), true);

        assert_eq!(ConfirmationType::classify(&within), ConfirmationType::None);
        assert_eq!(
            ConfirmationType::classify(&between),
            ConfirmationType::MoveBetweenSharedDrives
        );
        assert_eq!(
            ConfirmationType::MoveBetweenSharedDrives.messages(&between).len(),
            2
        );
    }

    #[test]
    fn test_membership_direction() {
        assert_eq!(
            ConfirmationType::classify(&sharing(Some("Design"), None, true)),
            ConfirmationType::MoveFromSharedDriveToOther
        );
        assert_eq!(
            ConfirmationType::classify(&sharing(None, Some("Design"), true)),
            ConfirmationType::MoveFromOtherToSharedDrive
        );
        assert_eq!(
            ConfirmationType::classify(&sharing(None, Some("Design"), false)),
            ConfirmationType::CopyToSharedDrive
        );
        assert_eq!(
            ConfirmationType::classify(&sharing(Some("Design"), Some("Design"), false)),
            ConfirmationType::None
        );
    }

    #[test]
    fn test_shared_destination() {
        let mut copy = sharing(None, None, false);
        copy.destination_shared = true;

        assert_eq!(ConfirmationType::classify(&copy), ConfirmationType::CopyToShared);
        assert!(ConfirmationType::CopyToShared.messages(&copy)[0].contains("'Target' is shared"));
        assert!(!ConfirmationType::classify(&sharing(None, None, true)).needs_confirmation());
    }
}
