use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;

use crate::connect_options::BrokerUrl;
use crate::error::{ClientError, Result};

pub async fn connect_plain(url: &BrokerUrl) -> Result<WebSocketStream<TcpStream>> {
    let tcp = super::tcp::connect(url).await?;
    let request = format!("ws://{}:{}{}", url.host, url.port, url.path);
    let (ws, _response) = tokio_tungstenite::client_async(request, tcp)
        .await
        .map_err(|e| ClientError::Transport(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
    Ok(ws)
}

pub async fn connect_tls(
    url: &BrokerUrl,
) -> Result<WebSocketStream<tokio_rustls::client::TlsStream<TcpStream>>> {
    let tls = super::tls::connect(url).await?;
    let request = format!("wss://{}:{}{}", url.host, url.port, url.path);
    let (ws, _response) = tokio_tungstenite::client_async(request, tls)
        .await
        .map_err(|e| ClientError::Transport(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
    Ok(ws)
}

pub async fn read_message_into<S>(ws: &mut WebSocketStream<S>, buf: &mut Vec<u8>) -> Result<usize>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match ws.next().await {
        Some(Ok(msg)) => {
            let data = msg.into_data();
            let len = data.len();
            buf.extend_from_slice(&data);
            Ok(len)
        }
        Some(Err(e)) => {
            Err(ClientError::Transport(std::io::Error::new(std::io::ErrorKind::Other, e)))
        }
        None => Ok(0),
    }
}

pub async fn write_binary<S>(ws: &mut WebSocketStream<S>, bytes: &[u8]) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    ws.send(Message::binary(bytes.to_vec()))
        .await
        .map_err(|e| ClientError::Transport(std::io::Error::new(std::io::ErrorKind::Other, e)))
}

pub async fn close<S>(ws: &mut WebSocketStream<S>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    ws.close(None)
        .await
        .map_err(|e| ClientError::Transport(std::io::Error::new(std::io::ErrorKind::Other, e)))
}
