//! Closed table of `%{NAME}` server variables.
//!
//! Names are matched case-sensitively, as listed in the
//! [`RewriteCond`](https://httpd.apache.org/docs/current/mod/mod_rewrite.html#rewritecond)
//! documentation.

use std::fmt;
use std::str::FromStr;

use crate::error::FormatError;

/// Category a [`ServerVariable`] belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VariableType {
    HttpHeaders,
    ConnectionAndRequest,
    ServerInternals,
    DateAndTime,
    Specials,
}

macro_rules! server_variables {
    ($($variant:ident => $name:literal, $kind:ident $(, header = $header:literal)?;)+) => {
        /// Named, read-only value derived from the request and server.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum ServerVariable {
            $($variant,)+
        }

        impl ServerVariable {
            /// Every known variable in declaration order.
            pub const ALL: &'static [ServerVariable] = &[$(Self::$variant,)+];

            /// Name as written inside `%{...}`.
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }

            pub fn kind(&self) -> VariableType {
                match self {
                    $(Self::$variant => VariableType::$kind,)+
                }
            }

            /// Request header the variable is extracted from, if any.
            pub fn header(&self) -> Option<&'static str> {
                match self {
                    $($(Self::$variant => Some($header),)?)+
                    #[allow(unreachable_patterns)]
                    _ => None,
                }
            }
        }

        impl FromStr for ServerVariable {
            type Err = FormatError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    _ => Err(FormatError::UnknownVariable(s.to_owned())),
                }
            }
        }
    };
}

server_variables! {
    HttpAccept => "HTTP_ACCEPT", HttpHeaders, header = "Accept";
    HttpCookie => "HTTP_COOKIE", HttpHeaders, header = "Cookie";
    HttpForwarded => "HTTP_FORWARDED", HttpHeaders, header = "Forwarded";
    HttpHost => "HTTP_HOST", HttpHeaders, header = "Host";
    HttpProxyConnection => "HTTP_PROXY_CONNECTION", HttpHeaders, header = "Proxy-Connection";
    HttpReferer => "HTTP_REFERER", HttpHeaders, header = "Referer";
    HttpUserAgent => "HTTP_USER_AGENT", HttpHeaders, header = "User-Agent";

    AuthType => "AUTH_TYPE", ConnectionAndRequest;
    ConnRemoteAddr => "CONN_REMOTE_ADDR", ConnectionAndRequest;
    ContextPrefix => "CONTEXT_PREFIX", ConnectionAndRequest;
    ContextDocumentRoot => "CONTEXT_DOCUMENT_ROOT", ConnectionAndRequest;
    Ipv6 => "IPV6", ConnectionAndRequest;
    PathInfo => "PATH_INFO", ConnectionAndRequest;
    QueryString => "QUERY_STRING", ConnectionAndRequest;
    RemoteAddr => "REMOTE_ADDR", ConnectionAndRequest;
    RemoteHost => "REMOTE_HOST", ConnectionAndRequest;
    RemoteIdent => "REMOTE_IDENT", ConnectionAndRequest;
    RemotePort => "REMOTE_PORT", ConnectionAndRequest;
    RemoteUser => "REMOTE_USER", ConnectionAndRequest;
    RequestMethod => "REQUEST_METHOD", ConnectionAndRequest;
    ScriptFilename => "SCRIPT_FILENAME", ConnectionAndRequest;

    DocumentRoot => "DOCUMENT_ROOT", ServerInternals;
    ScriptGroup => "SCRIPT_GROUP", ServerInternals;
    ScriptUser => "SCRIPT_USER", ServerInternals;
    ServerAddr => "SERVER_ADDR", ServerInternals;
    ServerAdmin => "SERVER_ADMIN", ServerInternals;
    ServerName => "SERVER_NAME", ServerInternals;
    ServerPort => "SERVER_PORT", ServerInternals;
    ServerProtocol => "SERVER_PROTOCOL", ServerInternals;
    ServerSoftware => "SERVER_SOFTWARE", ServerInternals;

    TimeYear => "TIME_YEAR", DateAndTime;
    TimeMon => "TIME_MON", DateAndTime;
    TimeDay => "TIME_DAY", DateAndTime;
    TimeHour => "TIME_HOUR", DateAndTime;
    TimeMin => "TIME_MIN", DateAndTime;
    TimeSec => "TIME_SEC", DateAndTime;
    TimeWday => "TIME_WDAY", DateAndTime;
    Time => "TIME", DateAndTime;

    ApiVersion => "API_VERSION", Specials;
    Https => "HTTPS", Specials;
    IsSubreq => "IS_SUBREQ", Specials;
    RequestFilename => "REQUEST_FILENAME", Specials;
    RequestScheme => "REQUEST_SCHEME", Specials;
    RequestUri => "REQUEST_URI", Specials;
    TheRequest => "THE_REQUEST", Specials;
}

impl fmt::Display for ServerVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{{{}}}", self.name())
    }
}
