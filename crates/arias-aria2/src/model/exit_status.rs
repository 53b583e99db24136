use std::fmt::{self, Display, Formatter};
use std::num::ParseIntError;
use std::str::FromStr;

/// Daemon exit status reported in a download's `errorCode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExitStatus {
    /// All downloads finished successfully.
    #[default]
    Success,
    /// Unknown error.
    UnknownError,
    /// Timeout.
    Timeout,
    /// Resource was not found.
    ResourceNotFound,
    /// Too many "resource not found" responses.
    ResourceNotFoundReached,
    /// Download aborted because speed was too slow.
    DownloadSpeedTooSlow,
    /// Network problem.
    NetworkProblem,
    /// Unfinished downloads remained at shutdown.
    UnfinishedDownloads,
    /// Remote server does not support resume.
    RemoteNoResume,
    /// Not enough disk space.
    NotEnoughDiskSpace,
    /// Piece length differs from the control file.
    PieceLengthMismatch,
    /// Same file was being downloaded.
    SameFileBeingDownloaded,
    /// Same info hash was being downloaded.
    SameInfoHashBeingDownloaded,
    /// File already exists.
    FileAlreadyExists,
    /// Renaming the file failed.
    RenamingFailed,
    /// Could not open an existing file.
    CouldNotOpenExistingFile,
    /// Could not create a new file or truncate an existing one.
    CouldNotCreateNewFile,
    /// File I/O error.
    FileIoError,
    /// Could not create a directory.
    CouldNotCreateDirectory,
    /// Name resolution failed.
    NameResolutionFailed,
    /// Metalink document could not be parsed.
    MetalinkParsingFailed,
    /// FTP command failed.
    FtpCommandFailed,
    /// HTTP response header was bad or unexpected.
    HttpResponseHeaderBad,
    /// Too many redirects.
    TooManyRedirects,
    /// HTTP authorization failed.
    HttpAuthorizationFailed,
    /// Bencoded file could not be parsed.
    BencodedFileParseError,
    /// Torrent file was corrupted or missing information.
    TorrentFileCorrupt,
    /// Magnet URI was bad.
    MagnetUriBad,
    /// Option was bad or unrecognized.
    BadOption,
    /// Remote server was too busy to handle the request.
    RemoteServerOverloaded,
    /// JSON-RPC request could not be parsed.
    JsonRpcParseError,
    /// Reserved, unused by the daemon.
    Reserved,
    /// Checksum validation failed.
    ChecksumValidationFailed,
    /// Code not known to this client.
    Other(u8),
}

const KNOWN: [ExitStatus; 33] = [
    ExitStatus::Success,
    ExitStatus::UnknownError,
    ExitStatus::Timeout,
    ExitStatus::ResourceNotFound,
    ExitStatus::ResourceNotFoundReached,
    ExitStatus::DownloadSpeedTooSlow,
    ExitStatus::NetworkProblem,
    ExitStatus::UnfinishedDownloads,
    ExitStatus::RemoteNoResume,
    ExitStatus::NotEnoughDiskSpace,
    ExitStatus::PieceLengthMismatch,
    ExitStatus::SameFileBeingDownloaded,
    ExitStatus::SameInfoHashBeingDownloaded,
    ExitStatus::FileAlreadyExists,
    ExitStatus::RenamingFailed,
    ExitStatus::CouldNotOpenExistingFile,
    ExitStatus::CouldNotCreateNewFile,
    ExitStatus::FileIoError,
    ExitStatus::CouldNotCreateDirectory,
    ExitStatus::NameResolutionFailed,
    ExitStatus::MetalinkParsingFailed,
    ExitStatus::FtpCommandFailed,
    ExitStatus::HttpResponseHeaderBad,
    ExitStatus::TooManyRedirects,
    ExitStatus::HttpAuthorizationFailed,
    ExitStatus::BencodedFileParseError,
    ExitStatus::TorrentFileCorrupt,
    ExitStatus::MagnetUriBad,
    ExitStatus::BadOption,
    ExitStatus::RemoteServerOverloaded,
    ExitStatus::JsonRpcParseError,
    ExitStatus::Reserved,
    ExitStatus::ChecksumValidationFailed,
];

impl ExitStatus {
    /// Map a numeric code onto a status, preserving unknown codes.
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        KNOWN
            .get(usize::from(code))
            .copied()
            .unwrap_or(Self::Other(code))
    }

    /// Numeric code as reported by the daemon.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Other(code) => code,
            known => KNOWN
                .iter()
                .position(|candidate| *candidate == known)
                .and_then(|index| u8::try_from(index).ok())
                .unwrap_or(u8::MAX),
        }
    }

    /// Whether the code reports success.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl Display for ExitStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.code())
    }
}

impl FromStr for ExitStatus {
    type Err = ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.trim().parse::<u8>().map(Self::from_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_both_ways() {
        for code in 0..=32_u8 {
            let status = ExitStatus::from_code(code);
            assert!(!matches!(status, ExitStatus::Other(_)));
            assert_eq!(status.code(), code);
        }
        assert_eq!(ExitStatus::from_code(3), ExitStatus::ResourceNotFound);
        assert_eq!(ExitStatus::from_code(24), ExitStatus::HttpAuthorizationFailed);
        assert_eq!(ExitStatus::from_code(32), ExitStatus::ChecksumValidationFailed);
        assert_eq!(ExitStatus::from_code(77), ExitStatus::Other(77));
        assert_eq!(ExitStatus::Other(77).code(), 77);
    }

    #[test]
    fn parses_string_codes() {
        assert_eq!("0".parse::<ExitStatus>(), Ok(ExitStatus::Success));
        assert_eq!("9".parse::<ExitStatus>(), Ok(ExitStatus::NotEnoughDiskSpace));
        assert!("x".parse::<ExitStatus>().is_err());
        assert!(ExitStatus::default().is_success());
    }
}
